use serde::{Deserialize, Serialize};

/// Transport failure returned by a [`crate::api::SupersetApi`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("superset_api_{status_code}:{message}")]
pub struct ApiError {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message).with_code("network_error")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The refresh call succeeded but carried no usable bearer string.
    #[error("guest token missing{}", missing_details(.code.as_deref(), .message.as_deref()))]
    Missing {
        code: Option<String>,
        message: Option<String>,
    },
    #[error("guest token request failed: {0}")]
    Request(#[from] ApiError),
}

fn missing_details(code: Option<&str>, message: Option<&str>) -> String {
    let details = [
        code.map(|code| format!("code={code}")),
        message.map(|message| format!("msg={message}")),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();
    if details.is_empty() {
        String::new()
    } else {
        format!(" ({})", details.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmbedError {
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error("embed mount failed: {message}")]
    Mount { message: String },
    #[error("embed capability {capability} failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },
}

impl EmbedError {
    pub fn mount(message: impl Into<String>) -> Self {
        Self::Mount {
            message: message.into(),
        }
    }

    pub fn capability(capability: &'static str, message: impl Into<String>) -> Self {
        Self::Capability {
            capability,
            message: message.into(),
        }
    }
}

/// Every way a session can fail, and how loudly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionFailure {
    #[error("embed target is missing")]
    MissingEmbedTarget,
    #[error("credential missing: {0}")]
    CredentialMissing(CredentialError),
    #[error("mount failed: {0}")]
    MountFailure(EmbedError),
    #[error("content size query failed: {0}")]
    GeometryQueryFailure(EmbedError),
    #[error("theme apply failed: {0}")]
    ThemeApplyFailure(EmbedError),
    #[error("push failed: {0}")]
    PushFailure(ApiError),
    #[error("dashboard list failed: {0}")]
    DashboardListFailure(ApiError),
}

impl SessionFailure {
    /// Classifies a rejected mount. Credential failures surface through the
    /// embed call because the frame pulls its token lazily.
    pub fn from_mount_error(error: EmbedError) -> Self {
        match error {
            EmbedError::Credential(credential @ CredentialError::Missing { .. }) => {
                Self::CredentialMissing(credential)
            }
            other => Self::MountFailure(other),
        }
    }

    /// Geometry and theme failures self-heal on the next trigger and are only logged.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Self::MissingEmbedTarget | Self::GeometryQueryFailure(_) | Self::ThemeApplyFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_missing_message_lists_upstream_details() {
        let error = CredentialError::Missing {
            code: Some("500".to_string()),
            message: Some("superset down".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "guest token missing (code=500, msg=superset down)"
        );

        let bare = CredentialError::Missing {
            code: None,
            message: None,
        };
        assert_eq!(bare.to_string(), "guest token missing");
    }

    #[test]
    fn mount_error_with_missing_credential_is_classified_as_credential_failure() {
        let failure = SessionFailure::from_mount_error(EmbedError::Credential(
            CredentialError::Missing {
                code: None,
                message: None,
            },
        ));
        assert!(matches!(failure, SessionFailure::CredentialMissing(_)));

        let failure = SessionFailure::from_mount_error(EmbedError::mount("sdk rejected"));
        assert!(matches!(failure, SessionFailure::MountFailure(_)));
    }

    #[test]
    fn geometry_and_theme_failures_are_silent() {
        let geometry =
            SessionFailure::GeometryQueryFailure(EmbedError::capability("getScrollSize", "boom"));
        let theme =
            SessionFailure::ThemeApplyFailure(EmbedError::capability("setThemeMode", "boom"));
        assert!(!geometry.is_user_visible());
        assert!(!theme.is_user_visible());
        assert!(SessionFailure::PushFailure(ApiError::new(500, "boom")).is_user_visible());
    }
}
