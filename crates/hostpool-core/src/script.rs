//! Setup script templating.
//!
//! The setup script installs the session agent on a freshly created node
//! and registers it with its pool. The template is plain text with
//! `{{pool}}`, `{{registration_token}}` and `{{host_name}}` placeholders.
//! Unknown placeholders are left as-is.

use thiserror::Error;

use crate::types::RegistrationToken;

const POOL: &str = "{{pool}}";
const TOKEN: &str = "{{registration_token}}";
const HOST_NAME: &str = "{{host_name}}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("setup script template is empty")]
    Empty,

    #[error("setup script template has no {{{{registration_token}}}} placeholder")]
    MissingToken,
}

/// A validated setup script template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupScript {
    template: String,
}

impl SetupScript {
    pub fn new(template: impl Into<String>) -> Result<Self, ScriptError> {
        let template = template.into();
        if template.trim().is_empty() {
            return Err(ScriptError::Empty);
        }
        if !template.contains(TOKEN) {
            return Err(ScriptError::MissingToken);
        }
        Ok(Self { template })
    }

    /// Substitute the pool, token, and host name into the template.
    ///
    /// A single left-to-right pass: inserted values are never rescanned.
    pub fn render(&self, pool: &str, token: &RegistrationToken, host_name: &str) -> String {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            rest = &rest[start..];
            let Some(end) = rest.find("}}").map(|i| i + 2) else {
                break;
            };
            let placeholder = &rest[..end];
            match placeholder {
                POOL => out.push_str(pool),
                TOKEN => out.push_str(token.expose()),
                HOST_NAME => out.push_str(host_name),
                other => out.push_str(other),
            }
            rest = &rest[end..];
        }
        out.push_str(rest);
        out
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_placeholders() {
        let script = SetupScript::new(
            "install --pool {{pool}} --token {{registration_token}} --name {{host_name}}",
        )
        .unwrap();
        let rendered = script.render("pool-a", &RegistrationToken::new("tok"), "sh-01");
        assert_eq!(rendered, "install --pool pool-a --token tok --name sh-01");
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let script = SetupScript::new("{{registration_token}} {{domain}}").unwrap();
        let rendered = script.render("pool-a", &RegistrationToken::new("tok"), "sh-01");
        assert_eq!(rendered, "tok {{domain}}");
    }

    #[test]
    fn inserted_values_are_not_rescanned() {
        let script = SetupScript::new("--pool {{pool}} --token {{registration_token}}").unwrap();
        let rendered = script.render(
            "{{registration_token}}",
            &RegistrationToken::new("{{host_name}}"),
            "sh-01",
        );
        assert_eq!(rendered, "--pool {{registration_token}} --token {{host_name}}");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let script = SetupScript::new("{{registration_token}} {{pool").unwrap();
        let rendered = script.render("pool-a", &RegistrationToken::new("tok"), "sh-01");
        assert_eq!(rendered, "tok {{pool");
    }

    #[test]
    fn rejects_empty_template() {
        assert_eq!(SetupScript::new("  \n"), Err(ScriptError::Empty));
    }

    #[test]
    fn rejects_template_without_token() {
        assert_eq!(
            SetupScript::new("install --pool {{pool}}"),
            Err(ScriptError::MissingToken)
        );
    }

    #[test]
    fn error_message_names_placeholder() {
        assert_eq!(
            ScriptError::MissingToken.to_string(),
            "setup script template has no {{registration_token}} placeholder"
        );
    }
}
