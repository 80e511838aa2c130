// src/models/identity.rs

use serde::{Deserialize, Serialize};

/// Who is taking the form. Which fields are mandatory depends on the
/// form's `IdentityRequirements`. Captured once per attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl ResponderIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }
}
