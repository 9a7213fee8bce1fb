use std::{str::FromStr, sync::Arc};

use shared::{
    domain::{Address, AddressId, AddressPatch, NewAddress, Role, UserId},
    error::{ApiError, ErrorCode},
    protocol::{AddressTargetBody, CreateAddressRequest, MessageResponse},
};
use storage::{AddressFilter, AddressStore};
use tracing::{error, info, warn};

pub mod auth;
pub mod validation;

use auth::AuthConfig;
use validation::{validate_fields, FieldRules};

#[derive(Clone)]
pub struct ApiContext {
    pub store: Arc<dyn AddressStore>,
    pub auth: AuthConfig,
}

/// The authenticated caller, resolved before any handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: UserId,
    pub role: Role,
}

/// Identifiers a request addresses, taken from the path first and the body second.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub address_id: Option<String>,
    pub owner_id: Option<UserId>,
}

impl Target {
    pub fn resolve(path: AddressTargetBody, body: Option<AddressTargetBody>) -> Self {
        let body = body.unwrap_or_default();
        Self {
            address_id: non_blank(path.address_id).or_else(|| non_blank(body.address_id)),
            owner_id: path
                .owner_id
                .filter(|id| !id.0.trim().is_empty())
                .or_else(|| body.owner_id.filter(|id| !id.0.trim().is_empty())),
        }
    }

    fn address_id(&self) -> Result<AddressId, ApiError> {
        let raw = self
            .address_id
            .as_deref()
            .ok_or_else(|| ApiError::validation("addressId is required"))?;
        // Anything that is not a well-formed id cannot name a stored record.
        AddressId::from_str(raw).map_err(|_| ApiError::not_found("address not found"))
    }

    fn owner_id(&self) -> Result<UserId, ApiError> {
        self.owner_id
            .clone()
            .ok_or_else(|| ApiError::validation("userId is required"))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn create_address(
    ctx: &ApiContext,
    req: CreateAddressRequest,
) -> Result<Address, ApiError> {
    validate_fields(
        &[
            ("ownerId", req.owner_id.as_deref()),
            ("street", req.street.as_deref()),
            ("number", req.number.as_deref()),
            ("neighborhood", req.neighborhood.as_deref()),
            ("city", req.city.as_deref()),
            ("state", req.state.as_deref()),
            ("zipCode", req.zip_code.as_deref()),
        ],
        FieldRules::REQUIRED,
    )
    .map_err(|e| {
        warn!(error = %e, "rejected address create");
        ApiError::validation(e.to_string())
    })?;

    let record = NewAddress {
        owner_id: UserId(req.owner_id.unwrap_or_default()),
        street: req.street.unwrap_or_default(),
        number: req.number.unwrap_or_default(),
        complement: req.complement,
        neighborhood: req.neighborhood.unwrap_or_default(),
        city: req.city.unwrap_or_default(),
        state: req.state.unwrap_or_default(),
        zip_code: req.zip_code.unwrap_or_default(),
        country: req.country,
    };
    let owner_id = record.owner_id.clone();
    let address = ctx.store.create(record).await.map_err(|e| {
        error!(%owner_id, error = %e, "store rejected address create");
        ApiError::validation(e.to_string())
    })?;
    info!(address_id = %address.id, %owner_id, "address created");
    Ok(address)
}

pub async fn addresses_by_owner(
    ctx: &ApiContext,
    caller: &AuthContext,
    target: Target,
) -> Result<Vec<Address>, ApiError> {
    let owner_id = if caller.role.is_elevated() {
        target.owner_id.unwrap_or_else(|| caller.user_id.clone())
    } else {
        caller.user_id.clone()
    };

    let addresses = ctx
        .store
        .find_all(Some(AddressFilter::by_owner(owner_id.clone())))
        .await
        .map_err(|e| internal("addresses_by_owner", e))?;
    if addresses.is_empty() {
        return Err(
            ApiError::not_found(format!("no addresses found for user {owner_id}"))
                .with_message_key(),
        );
    }
    Ok(addresses)
}

/// Every address across all owners. Restricted to elevated callers.
pub async fn list_addresses(
    ctx: &ApiContext,
    caller: &AuthContext,
) -> Result<Vec<Address>, ApiError> {
    if !caller.role.is_elevated() {
        warn!(user_id = %caller.user_id, "non-elevated caller listed all addresses");
        return Err(ApiError::forbidden("listing all addresses requires an elevated role"));
    }
    ctx.store
        .find_all(None)
        .await
        .map_err(|e| internal("list_addresses", e))
}

pub async fn address_by_id(ctx: &ApiContext, target: Target) -> Result<Address, ApiError> {
    let address_id = target.address_id()?;
    find_existing(ctx, address_id, "address_by_id").await
}

pub async fn set_primary_address(
    ctx: &ApiContext,
    target: Target,
) -> Result<MessageResponse, ApiError> {
    let owner_id = target.owner_id()?;
    let address_id = target.address_id()?;

    let applied = ctx
        .store
        .set_primary(&owner_id, address_id)
        .await
        .map_err(|e| internal("set_primary_address", e))?;
    if !applied {
        warn!(%owner_id, %address_id, "primary address target not owned by user");
        return Err(ApiError::not_found("address not found for user"));
    }
    info!(%owner_id, %address_id, "primary address updated");
    Ok(MessageResponse::new("primary address updated"))
}

pub async fn primary_address(ctx: &ApiContext, target: Target) -> Result<Address, ApiError> {
    let owner_id = target.owner_id()?;
    ctx.store
        .find_one(AddressFilter::primary_of(owner_id))
        .await
        .map_err(|e| internal("primary_address", e))?
        .ok_or_else(|| ApiError::not_found("primary address not found"))
}

pub async fn update_address(
    ctx: &ApiContext,
    target: Target,
    patch: AddressPatch,
) -> Result<Address, ApiError> {
    let address_id = target.address_id()?;
    validate_fields(
        &[
            ("street", patch.street.as_deref()),
            ("number", patch.number.as_deref()),
            ("neighborhood", patch.neighborhood.as_deref()),
            ("city", patch.city.as_deref()),
            ("state", patch.state.as_deref()),
            ("zipCode", patch.zip_code.as_deref()),
        ],
        FieldRules::OPTIONAL,
    )
    .map_err(|e| ApiError::validation(e.to_string()))?;

    find_existing(ctx, address_id, "update_address").await?;
    ctx.store
        .update_record(address_id, patch)
        .await
        .map_err(|e| internal("update_address", e))?
        .ok_or_else(|| ApiError::not_found("address not found"))
}

pub async fn delete_address(ctx: &ApiContext, target: Target) -> Result<MessageResponse, ApiError> {
    let address_id = target.address_id()?;
    find_existing(ctx, address_id, "delete_address").await?;

    let removed = ctx
        .store
        .destroy(address_id)
        .await
        .map_err(|e| internal("delete_address", e))?;
    if !removed {
        return Err(ApiError::not_found("address not found"));
    }
    info!(%address_id, "address deleted");
    Ok(MessageResponse::new("address deleted"))
}

pub async fn health(ctx: &ApiContext) -> Result<(), ApiError> {
    ctx.store.health_check().await.map_err(|e| {
        error!(error = %e, "store health check failed");
        ApiError::new(ErrorCode::Unavailable, "store unavailable")
    })
}

async fn find_existing(
    ctx: &ApiContext,
    address_id: AddressId,
    operation: &'static str,
) -> Result<Address, ApiError> {
    ctx.store
        .find_by_id(address_id)
        .await
        .map_err(|e| internal(operation, e))?
        .ok_or_else(|| ApiError::not_found("address not found"))
}

fn internal(operation: &'static str, err: anyhow::Error) -> ApiError {
    error!(operation, error = %err, "address store failure");
    ApiError::internal(err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
