//! # Gatewayエンドポイント

pub mod form;
pub mod otp;
pub mod seal;
pub mod sign;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use otp::{handle_activate_seal, handle_request_seal_otp, handle_request_totp};
pub use seal::handle_seal;
pub use sign::handle_sign;
