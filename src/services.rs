pub mod lifecycle;
pub mod oracle;
pub mod signer;
pub mod states;
