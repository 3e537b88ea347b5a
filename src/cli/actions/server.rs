use crate::{auth::AuthConfig, cli::telemetry, warden};
use anyhow::Result;
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub auth: AuthConfig,
    pub frontend_base_url: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let result = warden::new(
        args.port,
        args.dsn,
        args.auth,
        args.frontend_base_url,
    )
    .await;

    telemetry::shutdown_tracer();
    result
}

fn log_startup_args(args: &Args) {
    let (access_ttl, refresh_ttl) = (args.auth.access_ttl_seconds(), args.auth.refresh_ttl_seconds());
    let (memory_kib, iterations, parallelism) = args.auth.hash_cost();
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "store",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), redact_dsn),
        ),
        ("access_ttl_seconds", access_ttl.to_string()),
        ("refresh_ttl_seconds", refresh_ttl.to_string()),
        ("csrf_ttl_seconds", args.auth.csrf_ttl_seconds().to_string()),
        (
            "argon2",
            format!("m={memory_kib},t={iterations},p={parallelism}"),
        ),
        (
            "lockout",
            format!(
                "{} failures / {}s",
                args.auth.max_failed_logins(),
                args.auth.lockout_seconds()
            ),
        ),
        ("revoke_on_reuse", args.auth.revoke_on_reuse().to_string()),
        ("cookie_secure", args.auth.cookie_secure().to_string()),
        (
            "frontend_base_url",
            args.frontend_base_url
                .clone()
                .unwrap_or_else(|| "none".to_string()),
        ),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} ({})\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
