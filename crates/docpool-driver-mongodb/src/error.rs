//! Mapping of MongoDB driver errors onto docpool error classes

use docpool_core::{DocPoolError, ErrorClass};
use mongodb::error::{Error as MongoError, ErrorKind, RETRYABLE_WRITE_ERROR, WriteFailure};

/// Server error codes for rejected credentials or missing privileges
const AUTH_CODES: &[i32] = &[
    11, // UserNotFound
    13, // Unauthorized
    18, // AuthenticationFailed
    31, // RoleNotFound
];

/// Server error codes caused by a malformed request
const ARGUMENT_CODES: &[i32] = &[
    2,     // BadValue
    9,     // FailedToParse
    14,    // TypeMismatch
    17,    // InvalidLength
    40,    // ConflictingUpdateOperators
    52,    // DollarPrefixedFieldName
    56,    // EmptyFieldName
    66,    // ImmutableField
    73,    // InvalidNamespace
    121,   // DocumentValidationFailure
    11000, // DuplicateKey
    15952, // unknown aggregation stage
    16410, // $-prefixed field in $project
    40324, // unrecognized pipeline stage name
];

/// Server error codes that clear after a reconnect or failover
const TRANSIENT_CODES: &[i32] = &[
    6,     // HostUnreachable
    7,     // HostNotFound
    89,    // NetworkTimeout
    91,    // ShutdownInProgress
    189,   // PrimarySteppedDown
    262,   // ExceededTimeLimit
    9001,  // SocketException
    10107, // NotWritablePrimary
    11600, // InterruptedAtShutdown
    11602, // InterruptedDueToReplStateChange
    13435, // NotPrimaryNoSecondaryOk
    13436, // NotPrimaryOrSecondary
];

/// Class of a server error code; unknown codes are protocol errors
pub(crate) fn classify_code(code: i32) -> ErrorClass {
    if AUTH_CODES.contains(&code) {
        ErrorClass::Auth
    } else if ARGUMENT_CODES.contains(&code) {
        ErrorClass::Argument
    } else if TRANSIENT_CODES.contains(&code) {
        ErrorClass::Transient
    } else {
        ErrorClass::Protocol
    }
}

pub(crate) fn classify_kind(kind: &ErrorKind) -> ErrorClass {
    match kind {
        ErrorKind::InvalidArgument { .. } | ErrorKind::BsonSerialization(_) => {
            ErrorClass::Argument
        }
        ErrorKind::Authentication { .. } => ErrorClass::Auth,
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => ErrorClass::Transient,
        ErrorKind::Command(command) => classify_code(command.code),
        ErrorKind::Write(WriteFailure::WriteError(write)) => classify_code(write.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => classify_code(concern.code),
        // Individual document failures in a batch are caller errors
        ErrorKind::InsertMany(_) => ErrorClass::Argument,
        _ => ErrorClass::Protocol,
    }
}

/// Convert a MongoDB error into a classified `DocPoolError`.
///
/// Anything the server labels as a retryable write is transient regardless
/// of its kind.
pub fn map_error(err: MongoError) -> DocPoolError {
    let class = if err.contains_label(RETRYABLE_WRITE_ERROR) {
        ErrorClass::Transient
    } else {
        classify_kind(&err.kind)
    };
    let message = err.to_string();

    match class {
        ErrorClass::Argument => DocPoolError::Argument(message),
        ErrorClass::Auth => DocPoolError::Auth(message),
        ErrorClass::Transient => DocPoolError::TransientConnectivity(message),
        _ => DocPoolError::Protocol(message),
    }
}

/// Errors raised while parsing a connection URI.
///
/// Malformed URIs are configuration problems; SRV and TXT lookups that
/// fail during parsing keep their ordinary classification.
pub(crate) fn map_parse_error(err: MongoError) -> DocPoolError {
    match &*err.kind {
        ErrorKind::InvalidArgument { message, .. } => {
            DocPoolError::invalid_config("uri", message.clone())
        }
        _ => map_error(err),
    }
}
