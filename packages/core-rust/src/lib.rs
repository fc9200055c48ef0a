//! Restgate Core — binding normalization, codecs, response envelope, and error taxonomy.

pub mod binding;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod method;
pub mod validator;

pub use binding::normalize;
pub use codec::{Codec, CodecError, Strictness};
pub use error::DispatchFailure;
pub use method::Method;
pub use validator::{ValidationOutcome, Validator};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
