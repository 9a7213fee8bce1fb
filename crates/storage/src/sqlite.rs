use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::domain::{Address, AddressId, AddressPatch, NewAddress, UserId};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, QueryBuilder, Row, Sqlite,
};

use crate::{AddressFilter, AddressStore};

const ADDRESS_COLUMNS: &str = "id, owner_id, street, number, complement, neighborhood, city, \
                               state, zip_code, country, is_primary, created_at, updated_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database is a separate database.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn fetch_filtered(
        &self,
        filter: &AddressFilter,
        limit: Option<i64>,
    ) -> Result<Vec<Address>> {
        let mut qb =
            QueryBuilder::<Sqlite>::new(format!("SELECT {ADDRESS_COLUMNS} FROM addresses"));
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY rowid ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(address_from_row).collect()
    }
}

#[async_trait]
impl AddressStore for SqliteStore {
    async fn create(&self, record: NewAddress) -> Result<Address> {
        let address = record.into_address(AddressId::generate(), Utc::now());
        sqlx::query(
            "INSERT INTO addresses (id, owner_id, street, number, complement, neighborhood, city,
                                    state, zip_code, country, is_primary, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(address.id.to_string())
        .bind(address.owner_id.as_str())
        .bind(&address.street)
        .bind(&address.number)
        .bind(address.complement.as_deref())
        .bind(&address.neighborhood)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(address.country.as_deref())
        .bind(address.is_primary)
        .bind(address.created_at)
        .bind(address.updated_at)
        .execute(&self.pool)
        .await
        .context("failed to insert address")?;
        Ok(address)
    }

    async fn find_all(&self, filter: Option<AddressFilter>) -> Result<Vec<Address>> {
        self.fetch_filtered(&filter.unwrap_or_default(), None).await
    }

    async fn find_one(&self, filter: AddressFilter) -> Result<Option<Address>> {
        Ok(self.fetch_filtered(&filter, Some(1)).await?.into_iter().next())
    }

    async fn find_by_id(&self, id: AddressId) -> Result<Option<Address>> {
        let row = sqlx::query(&format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(address_from_row).transpose()
    }

    async fn update(&self, filter: AddressFilter, patch: AddressPatch) -> Result<u64> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE addresses SET updated_at = ");
        qb.push_bind(Utc::now());
        for (column, value) in patch_columns(&patch) {
            qb.push(format!(", {column} = ")).push_bind(value);
        }
        push_filter(&mut qb, &filter);
        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("failed to update addresses")?;
        Ok(result.rows_affected())
    }

    async fn update_record(&self, id: AddressId, patch: AddressPatch) -> Result<Option<Address>> {
        let Some(mut address) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        if !address.apply(&patch) {
            return Ok(Some(address));
        }
        address.updated_at = Utc::now();

        sqlx::query(
            "UPDATE addresses
             SET street = ?, number = ?, complement = ?, neighborhood = ?, city = ?,
                 state = ?, zip_code = ?, country = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&address.street)
        .bind(&address.number)
        .bind(address.complement.as_deref())
        .bind(&address.neighborhood)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zip_code)
        .bind(address.country.as_deref())
        .bind(address.updated_at)
        .bind(address.id.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update address {id}"))?;
        Ok(Some(address))
    }

    async fn destroy(&self, id: AddressId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM addresses WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to delete address {id}"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_primary(&self, owner_id: &UserId, id: AddressId) -> Result<bool> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        // Open with a write so the transaction takes the write lock up front
        // and waits on the busy timeout instead of failing on upgrade.
        sqlx::query(
            "UPDATE addresses SET is_primary = 0, updated_at = ?
             WHERE owner_id = ? AND is_primary = 1",
        )
        .bind(now)
        .bind(owner_id.as_str())
        .execute(&mut *tx)
        .await
        .context("failed to clear primary address")?;

        let marked = sqlx::query(
            "UPDATE addresses SET is_primary = 1, updated_at = ?
             WHERE id = ? AND owner_id = ?",
        )
        .bind(now)
        .bind(id.to_string())
        .bind(owner_id.as_str())
        .execute(&mut *tx)
        .await
        .context("failed to mark primary address")?;
        if marked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AddressFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id.to_string());
    }
    if let Some(owner_id) = &filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner_id.0.clone());
    }
    if let Some(is_primary) = filter.is_primary {
        qb.push(" AND is_primary = ").push_bind(is_primary);
    }
}

fn patch_columns(patch: &AddressPatch) -> Vec<(&'static str, String)> {
    [
        ("street", &patch.street),
        ("number", &patch.number),
        ("complement", &patch.complement),
        ("neighborhood", &patch.neighborhood),
        ("city", &patch.city),
        ("state", &patch.state),
        ("zip_code", &patch.zip_code),
        ("country", &patch.country),
    ]
    .into_iter()
    .filter_map(|(column, value)| value.clone().map(|value| (column, value)))
    .collect()
}

fn address_from_row(row: &SqliteRow) -> Result<Address> {
    let raw_id: String = row.try_get("id")?;
    let id = AddressId::from_str(&raw_id)
        .with_context(|| format!("stored address id '{raw_id}' is not a uuid"))?;
    Ok(Address {
        id,
        owner_id: UserId(row.try_get("owner_id")?),
        street: row.try_get("street")?,
        number: row.try_get("number")?,
        complement: row.try_get("complement")?,
        neighborhood: row.try_get("neighborhood")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        zip_code: row.try_get("zip_code")?,
        country: row.try_get("country")?,
        is_primary: row.try_get("is_primary")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;
    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}
