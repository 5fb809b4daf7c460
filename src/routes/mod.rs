mod check_health;
mod domain;
mod preorder;
mod stripe_webhook;
mod subscribe;

pub use check_health::*;
pub use domain::*;
pub use preorder::*;
pub use stripe_webhook::*;
pub use subscribe::*;
