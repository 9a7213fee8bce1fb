use serde::{Deserialize, Serialize};

use crate::domain::{AddressPatch, UserId};

/// Create request body. Fields are optional on the wire so that missing
/// values surface as validation errors rather than deserialization failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAddressRequest {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub complement: Option<String>,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Identifiers that may be supplied in a body instead of the path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressTargetBody {
    #[serde(default)]
    pub address_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub owner_id: Option<UserId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAddressRequest {
    #[serde(default)]
    pub address_id: Option<String>,
    #[serde(flatten)]
    pub patch: AddressPatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_body_accepts_user_id_alias() {
        let body: AddressTargetBody =
            serde_json::from_str(r#"{"userId":"u7","addressId":"abc"}"#).expect("json");
        assert_eq!(body.owner_id, Some(UserId::new("u7")));
        assert_eq!(body.address_id.as_deref(), Some("abc"));
    }

    #[test]
    fn update_request_splits_id_from_patch() {
        let body: UpdateAddressRequest = serde_json::from_str(
            r#"{"addressId":"abc","city":"Porto","isPrimary":true,"ownerId":"x"}"#,
        )
        .expect("json");
        assert_eq!(body.address_id.as_deref(), Some("abc"));
        assert_eq!(body.patch.city.as_deref(), Some("Porto"));
        assert!(body.patch.street.is_none());
    }
}
