pub mod api;
pub mod chain;
pub mod const_val;
pub mod invite;
