pub mod action;
pub mod conversation;
pub mod employee;
pub mod leave;
pub mod meeting;
pub mod onboarding;
