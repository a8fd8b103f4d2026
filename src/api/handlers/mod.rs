pub mod health;
pub mod inputs;
pub mod widget;
