use crate::session::SessionId;

pub const FACE_REGISTER_PATH: &str = "/ws/face-register/";

/// `<base>/ws/face-register/<session>`, tolerating a trailing slash on `base_url`
///
/// The token is appended verbatim.
pub fn face_register_endpoint(base_url: &str, session_id: &SessionId) -> String {
    format!(
        "{}{}{}",
        base_url.trim_end_matches('/'),
        FACE_REGISTER_PATH,
        session_id.as_str()
    )
}
