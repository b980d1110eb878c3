use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use state::StateErrorReason;
use state::StateErrorReason::{BackendFailure, Transient};

/// Service error codes worth another attempt
const TRANSIENT_ERROR_CODES: [&str; 5] = [
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ThrottlingException",
    "InternalServerError",
    "ServiceUnavailable",
];

/// Split SDK failures into those which may succeed on retry and those which won't.
pub(crate) fn classify<E>(err: SdkError<E, HttpResponse>) -> StateErrorReason
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let transient: bool = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(context) => context
            .err()
            .code()
            .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code)),
        _ => false,
    };

    if transient {
        Transient(err.into())
    } else {
        BackendFailure(err.into())
    }
}
