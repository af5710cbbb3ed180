//! Exit code contract
//!
//! Administrative commands must exit non-zero on failure so shell scripts can
//! branch on `$?`. Hook commands are the exception and are covered in
//! `cli_e2e.rs`.

use swarm::error::{code, get_error_info, ERROR_CODES};
use swarm::SwarmError;

#[test]
fn every_error_variant_maps_to_a_nonzero_exit_code() {
    let cases = vec![
        (SwarmError::ConfigError("x".to_string()), 2),
        (SwarmError::InvalidIdentifier("x".to_string()), 2),
        (SwarmError::DatabaseError("x".to_string()), 3),
        (SwarmError::PatternError("x".to_string()), 4),
        (SwarmError::PatternExists("x".to_string()), 4),
        (SwarmError::PatternNotFound("x".to_string()), 5),
        (SwarmError::DaemonError("x".to_string()), 6),
        (SwarmError::IoError(std::io::Error::other("x")), 7),
    ];

    for (error, expected) in cases {
        assert_eq!(error.exit_code(), expected, "{error:?}");
        assert_ne!(error.exit_code(), 0);
    }
}

#[test]
fn every_protocol_code_is_documented() {
    for code in [
        code::CLI_ERROR,
        code::EXISTS,
        code::NOTFOUND,
        code::INVALID,
        code::CONFLICT,
        code::DEPENDENCY,
        code::INTERNAL,
    ] {
        assert!(get_error_info(code).is_some(), "undocumented code {code}");
    }
    assert_eq!(ERROR_CODES.len(), 7);
}
