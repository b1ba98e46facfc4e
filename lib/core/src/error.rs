//! Error handling foundation for huddle.
//!
//! Only the `Result` alias lives here. Each crate defines its own error
//! enums and wraps them in a rootcause `Report` where context needs to be
//! carried across layers (startup, background work).

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<u16> = Ok(8080);
        assert_eq!(ok.expect("should be ok"), 8080);
    }
}
