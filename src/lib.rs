//! User signup service: validates registrations, stores inactive users and
//! mails their activation token inside one transaction.

pub mod app;
pub mod config;
pub mod error;
pub mod mailer;
pub mod state;
pub mod users;
