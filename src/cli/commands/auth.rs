use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::AuthConfig;

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_CSRF_KEY: &str = "csrf-key";
pub const ARG_ACCESS_TTL_SECONDS: &str = "access-ttl-seconds";
pub const ARG_REFRESH_TTL_SECONDS: &str = "refresh-ttl-seconds";
pub const ARG_CSRF_TTL_SECONDS: &str = "csrf-ttl-seconds";
pub const ARG_HASH_MEMORY_KIB: &str = "hash-memory-kib";
pub const ARG_HASH_ITERATIONS: &str = "hash-iterations";
pub const ARG_HASH_PARALLELISM: &str = "hash-parallelism";
pub const ARG_MAX_FAILED_LOGINS: &str = "max-failed-logins";
pub const ARG_LOCKOUT_SECONDS: &str = "lockout-seconds";
pub const ARG_REVOKE_ON_REUSE: &str = "revoke-on-reuse";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[derive(Debug)]
pub struct Options {
    pub config: AuthConfig,
    pub frontend_base_url: Option<String>,
}

impl Options {
    /// Parse auth arguments into a validated [`AuthConfig`].
    ///
    /// # Errors
    /// Returns an error if a key is missing or the resulting configuration is invalid.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_secret = |id: &str| -> Result<SecretString> {
            matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.as_str()))
                .with_context(|| format!("missing required argument: --{id}"))
        };
        let read = |id: &str| -> Result<i64> {
            matches
                .get_one::<i64>(id)
                .copied()
                .with_context(|| format!("missing argument: --{id}"))
        };
        let read_u32 = |id: &str| -> Result<u32> {
            matches
                .get_one::<u32>(id)
                .copied()
                .with_context(|| format!("missing argument: --{id}"))
        };

        let config = AuthConfig::new(read_secret(ARG_SIGNING_KEY)?, read_secret(ARG_CSRF_KEY)?)
            .with_access_ttl_seconds(read(ARG_ACCESS_TTL_SECONDS)?)
            .with_refresh_ttl_seconds(read(ARG_REFRESH_TTL_SECONDS)?)
            .with_csrf_ttl_seconds(read(ARG_CSRF_TTL_SECONDS)?)
            .with_hash_cost(
                read_u32(ARG_HASH_MEMORY_KIB)?,
                read_u32(ARG_HASH_ITERATIONS)?,
                read_u32(ARG_HASH_PARALLELISM)?,
            )
            .with_lockout(
                read_u32(ARG_MAX_FAILED_LOGINS)?,
                matches
                    .get_one::<u64>(ARG_LOCKOUT_SECONDS)
                    .copied()
                    .unwrap_or(900),
            )
            .with_revoke_on_reuse(
                matches
                    .get_one::<bool>(ARG_REVOKE_ON_REUSE)
                    .copied()
                    .unwrap_or(true),
            )
            .with_cookie_secure(
                matches
                    .get_one::<bool>(ARG_COOKIE_SECURE)
                    .copied()
                    .unwrap_or(true),
            );
        config.validate()?;

        Ok(Self {
            config,
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_key_args(command);
    let command = with_lifetime_args(command);
    let command = with_hash_args(command);
    with_policy_args(command)
}

fn with_key_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("HMAC key used to sign access tokens (at least 32 bytes)")
                .env("WARDEN_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CSRF_KEY)
                .long(ARG_CSRF_KEY)
                .help("HMAC key used for CSRF tokens (at least 32 bytes, distinct from the signing key)")
                .env("WARDEN_CSRF_KEY")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_lifetime_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TTL_SECONDS)
                .long(ARG_ACCESS_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("WARDEN_ACCESS_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL_SECONDS)
                .long(ARG_REFRESH_TTL_SECONDS)
                .help("Refresh token TTL in seconds, reset on every rotation")
                .env("WARDEN_REFRESH_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_CSRF_TTL_SECONDS)
                .long(ARG_CSRF_TTL_SECONDS)
                .help("CSRF token TTL in seconds")
                .env("WARDEN_CSRF_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_hash_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long(ARG_HASH_MEMORY_KIB)
                .help("Argon2id memory cost in KiB")
                .env("WARDEN_HASH_MEMORY_KIB")
                .default_value("19456")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_HASH_ITERATIONS)
                .long(ARG_HASH_ITERATIONS)
                .help("Argon2id iterations")
                .env("WARDEN_HASH_ITERATIONS")
                .default_value("2")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_HASH_PARALLELISM)
                .long(ARG_HASH_PARALLELISM)
                .help("Argon2id lanes")
                .env("WARDEN_HASH_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_FAILED_LOGINS)
                .long(ARG_MAX_FAILED_LOGINS)
                .help("Consecutive failed logins before lockout (0 disables)")
                .env("WARDEN_MAX_FAILED_LOGINS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_SECONDS)
                .long(ARG_LOCKOUT_SECONDS)
                .help("Lockout duration in seconds")
                .env("WARDEN_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REVOKE_ON_REUSE)
                .long(ARG_REVOKE_ON_REUSE)
                .help("Revoke the whole session when a consumed refresh token is replayed")
                .env("WARDEN_REVOKE_ON_REUSE")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark auth cookies Secure (disable only for plain-HTTP local development)")
                .env("WARDEN_COOKIE_SECURE")
                .default_value("true")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(bool)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend origin allowed to make credentialed cross-origin requests")
                .env("WARDEN_FRONTEND_BASE_URL"),
        )
}
