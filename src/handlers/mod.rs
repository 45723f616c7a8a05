pub mod auth;
pub mod branches;
pub mod comments;
pub mod dashboard;
pub mod general;
pub mod orders;
pub mod payments;
