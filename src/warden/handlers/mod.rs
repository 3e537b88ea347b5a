pub mod cookies;
pub mod csrf;
pub mod error;
pub mod health;
pub mod session;
pub mod signup;
pub mod types;
pub mod user;

pub use self::csrf::csrf_token;
pub use self::health::health;
pub use self::session::{login, logout, refresh};
pub use self::signup::signup;
pub use self::user::{change_password, delete_user, get_user};
