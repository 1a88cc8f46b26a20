use crate::errors::InviteeBusinessErrCode;
use crate::services::lifecycle::LifecycleError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct GeneralResponse<T> {
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> GeneralResponse<T>
where
    (StatusCode, Json<GeneralResponse<T>>): IntoResponse,
{
    pub fn new(msg: impl Into<String>, data: Option<T>) -> Self {
        Self {
            msg: msg.into(),
            data,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: Option<u32>,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
struct ApiEmitError<'a, E>
where
    E: std::error::Error + InviteeBusinessErrCode,
{
    msg: &'a str,
    business_code: &'a Option<u32>,
    error: &'a Option<E>,
}

impl ApiError {
    fn api_error_inner<E, T>(
        status: StatusCode,
        err: Option<E>,
        msg: Option<T>,
        fallback_msg: &str,
    ) -> Self
    where
        E: std::error::Error + InviteeBusinessErrCode,
        T: Into<String>,
    {
        let err_user_msg = msg.map(|m| m.into()).unwrap_or_else(|| fallback_msg.into());
        let business_code = err.as_ref().and_then(|e| e.code());
        tracing::error!(
            "An api error occurred! => {:?}",
            ApiEmitError {
                msg: &err_user_msg,
                business_code: &business_code,
                error: &err,
            }
        );
        Self {
            status,
            code: business_code,
            message: err_user_msg,
        }
    }
}

macro_rules! define_api_error {
    ($fn_name:ident, $http_status:expr, $fallback_msg:expr) => {
        impl ApiError {
            #[inline]
            pub fn $fn_name<E, T>(err: Option<E>, msg: Option<T>) -> Self
            where
                E: ::std::error::Error + $crate::errors::InviteeBusinessErrCode,
                T: Into<String>,
            {
                Self::api_error_inner($http_status, err, msg, $fallback_msg)
            }
        }
        macro_rules! $fn_name {
            (err = $err: expr) => {
                $crate::models::api::ApiError::$fn_name(Some($err), None::<&str>)
            };
            (msg = $msg: expr) => {
                $crate::models::api::ApiError::$fn_name::<::std::convert::Infallible, _>(
                    None,
                    Some($msg),
                )
            };
            ($msg: literal) => {
                $crate::models::api::ApiError::$fn_name::<::std::convert::Infallible, _>(
                    None,
                    Some($msg),
                )
            };
            ($msg: expr) => {
                $crate::models::api::ApiError::$fn_name::<::std::convert::Infallible, _>(
                    None,
                    Some($msg),
                )
            };
            ($err: expr,$msg: expr) => {
                $crate::models::api::ApiError::$fn_name(Some($err), Some($msg))
            };
        }
        #[allow(unused_imports)]
        pub(crate) use $fn_name;
    };
}

define_api_error!(bad_request, StatusCode::BAD_REQUEST, "Bad Request");
define_api_error!(unauthorized, StatusCode::UNAUTHORIZED, "Unauthorized");
define_api_error!(not_found, StatusCode::NOT_FOUND, "Not Found");
define_api_error!(conflict, StatusCode::CONFLICT, "Conflict");
define_api_error!(bad_gateway, StatusCode::BAD_GATEWAY, "Bad Gateway");
define_api_error!(
    internal,
    StatusCode::INTERNAL_SERVER_ERROR,
    "Internal Server Error"
);

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::DuplicateSecret => conflict!(e, "Invite already exists"),
            LifecycleError::AlreadyClaimed(_) => {
                let msg = e.to_string();
                conflict!(e, msg)
            }
            LifecycleError::NotFound => not_found!(e, "Invite not found"),
            LifecycleError::NoInviteAvailable => not_found!(e, "No invite available"),
            LifecycleError::Validation(_) | LifecycleError::NotRegistered(_) => {
                let msg = e.to_string();
                bad_request!(e, msg)
            }
            LifecycleError::OracleUnavailable(_) => {
                bad_gateway!(e, "Cannot reach the chain to confirm this invite")
            }
            LifecycleError::DataBase(_) => internal!(e, "Database error"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        LifecycleError::Validation(e.body_text()).into()
    }
}

impl From<PathRejection> for ApiError {
    fn from(e: PathRejection) -> Self {
        LifecycleError::Validation(e.body_text()).into()
    }
}

/// `Json` whose rejections answer in the `ApiError` shape.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

macro_rules! general_json_res {
    ($msg:literal) => {
        Json(GeneralResponse::new($msg, None))
    };
    ($msg:literal, $data:expr) => {
        Json(GeneralResponse::new($msg, Some($data)))
    };
}

pub(crate) use general_json_res;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(self);
        (status, body).into_response()
    }
}

pub mod prelude {
    pub use super::{ApiJson, ApiPath, ApiResult, GeneralResponse};
    pub(crate) use crate::models::api::{general_json_res, unauthorized};
}
