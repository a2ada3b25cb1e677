use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use uuid::Uuid;

use northstar_core::items::{
    ConnectionHealth, Item, ItemRepositoryTrait, ItemRetryState, ItemStatus, NewAccount,
    NewLinkedItem, SyncLease,
};
use northstar_core::{Error, Result};

use super::model::{connection_health, AccountDB, InstitutionDB, ItemDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{accounts, institutions, items};
use crate::utils::{from_db_time, to_db_time};

pub struct ItemRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl ItemRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn load_item(&self, item_id: &str) -> Result<Option<ItemDB>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(items::table
            .find(item_id)
            .select(ItemDB::as_select())
            .first::<ItemDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?)
    }

    pub fn list_item_accounts(&self, item_id: &str) -> Result<Vec<AccountDB>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(accounts::table
            .filter(accounts::item_id.eq(item_id))
            .order(accounts::plaid_account_id.asc())
            .select(AccountDB::as_select())
            .load::<AccountDB>(&mut conn)
            .map_err(StorageError::from)?)
    }

    pub fn get_institution(&self, institution_id: &str) -> Result<Option<InstitutionDB>> {
        let mut conn = get_connection(&self.pool)?;
        Ok(institutions::table
            .find(institution_id)
            .select(InstitutionDB::as_select())
            .first::<InstitutionDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?)
    }
}

/// Upserts the institution keyed by provider id and returns its local id.
fn upsert_institution(
    conn: &mut SqliteConnection,
    linked: &NewLinkedItem,
    now: &str,
) -> Result<String> {
    let row = InstitutionDB {
        id: Uuid::new_v4().to_string(),
        plaid_institution_id: linked.plaid_institution_id.clone(),
        name: linked.institution_name.clone(),
        logo_url: linked.institution_logo_url.clone(),
        created_at: now.to_string(),
        updated_at: now.to_string(),
    };

    Ok(diesel::insert_into(institutions::table)
        .values(&row)
        .on_conflict(institutions::plaid_institution_id)
        .do_update()
        .set((
            institutions::name.eq(&row.name),
            institutions::logo_url.eq(row.logo_url.clone()),
            institutions::updated_at.eq(now),
        ))
        .returning(institutions::id)
        .get_result::<String>(conn)
        .map_err(StorageError::from)?)
}

#[async_trait]
impl ItemRepositoryTrait for ItemRepository {
    fn get_item(&self, item_id: &str) -> Result<Option<Item>> {
        self.load_item(item_id)?.map(Item::try_from).transpose()
    }

    fn get_item_by_plaid_item_id(&self, plaid_item_id: &str) -> Result<Option<Item>> {
        let mut conn = get_connection(&self.pool)?;
        items::table
            .filter(items::plaid_item_id.eq(plaid_item_id))
            .select(ItemDB::as_select())
            .first::<ItemDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(Item::try_from)
            .transpose()
    }

    fn get_retry_state(&self, item_id: &str) -> Result<Option<ItemRetryState>> {
        self.load_item(item_id)?
            .as_ref()
            .map(ItemRetryState::try_from)
            .transpose()
    }

    fn list_connection_health(&self, user_id: &str) -> Result<Vec<ConnectionHealth>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = items::table
            .inner_join(institutions::table)
            .filter(items::user_id.eq(user_id))
            .order((items::created_at.asc(), items::id.asc()))
            .select((ItemDB::as_select(), institutions::name))
            .load::<(ItemDB, String)>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter()
            .map(|(item, institution_name)| connection_health(item, institution_name))
            .collect()
    }

    fn list_retryable_items_due(&self, now: DateTime<Utc>) -> Result<Vec<Item>> {
        let mut conn = get_connection(&self.pool)?;
        items::table
            .filter(items::status.eq(ItemStatus::Degraded.as_str()))
            .filter(items::next_retry_at.is_not_null())
            .filter(items::next_retry_at.le(to_db_time(now)))
            .order((items::next_retry_at.asc(), items::id.asc()))
            .select(ItemDB::as_select())
            .load::<ItemDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(Item::try_from)
            .collect()
    }

    async fn upsert_item_with_institution(&self, linked: NewLinkedItem) -> Result<Item> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Item> {
                let now = to_db_time(Utc::now());
                let institution_id = upsert_institution(conn, &linked, &now)?;

                let existing = items::table
                    .filter(items::plaid_item_id.eq(&linked.plaid_item_id))
                    .select(items::id)
                    .first::<String>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                let item_db = match existing {
                    Some(existing_id) => {
                        debug!("[Items] Re-linking item {}", existing_id);
                        diesel::update(items::table.find(existing_id))
                            .set((
                                items::user_id.eq(&linked.user_id),
                                items::institution_id.eq(&institution_id),
                                items::encrypted_access_token.eq(&linked.encrypted_access_token),
                                items::status.eq(ItemStatus::Healthy.as_str()),
                                items::error_code.eq(None::<String>),
                                items::error_message.eq(None::<String>),
                                items::updated_at.eq(&now),
                            ))
                            .returning(ItemDB::as_returning())
                            .get_result(conn)
                            .map_err(StorageError::from)?
                    }
                    None => {
                        let row = ItemDB {
                            id: Uuid::new_v4().to_string(),
                            user_id: linked.user_id,
                            institution_id,
                            plaid_item_id: linked.plaid_item_id,
                            encrypted_access_token: linked.encrypted_access_token,
                            status: ItemStatus::Healthy.as_str().to_string(),
                            cursor: None,
                            failure_count: 0,
                            next_retry_at: None,
                            error_code: None,
                            error_message: None,
                            last_webhook_at: None,
                            last_successful_sync_at: None,
                            sync_lease_token: None,
                            sync_lease_expires_at: None,
                            created_at: now.clone(),
                            updated_at: now,
                        };
                        diesel::insert_into(items::table)
                            .values(&row)
                            .returning(ItemDB::as_returning())
                            .get_result(conn)
                            .map_err(StorageError::from)?
                    }
                };

                Item::try_from(item_db)
            })
            .await
    }

    async fn upsert_accounts(
        &self,
        user_id: String,
        item_id: String,
        new_accounts: Vec<NewAccount>,
    ) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let now = to_db_time(Utc::now());
                let mut affected = 0;
                for account in new_accounts {
                    let row = AccountDB {
                        id: Uuid::new_v4().to_string(),
                        user_id: user_id.clone(),
                        item_id: item_id.clone(),
                        plaid_account_id: account.plaid_account_id,
                        name: account.name,
                        account_type: account.account_type,
                        subtype: account.subtype,
                        mask: account.mask,
                        current_balance_cents: account.current_balance_cents,
                        available_balance_cents: account.available_balance_cents,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    affected += diesel::insert_into(accounts::table)
                        .values(&row)
                        .on_conflict(accounts::plaid_account_id)
                        .do_update()
                        .set((
                            accounts::user_id.eq(&row.user_id),
                            accounts::item_id.eq(&row.item_id),
                            accounts::name.eq(&row.name),
                            accounts::account_type.eq(&row.account_type),
                            accounts::subtype.eq(row.subtype.clone()),
                            accounts::mask.eq(row.mask.clone()),
                            accounts::current_balance_cents.eq(row.current_balance_cents),
                            accounts::available_balance_cents.eq(row.available_balance_cents),
                            accounts::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(affected)
            })
            .await
    }

    async fn rotate_access_token_ciphertext(
        &self,
        item_id: String,
        encrypted_access_token: String,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let updated = diesel::update(items::table.find(&item_id))
                    .set((
                        items::encrypted_access_token.eq(encrypted_access_token),
                        items::updated_at.eq(to_db_time(Utc::now())),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if updated == 0 {
                    return Err(Error::not_found(format!("Item {} not found", item_id)));
                }
                Ok(())
            })
            .await
    }

    async fn acquire_sync_lease(
        &self,
        item_id: String,
        ttl: Duration,
    ) -> Result<Option<SyncLease>> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Option<SyncLease>> {
                let now = Utc::now();
                let expires_at = to_db_time(now + ttl);
                let token = Uuid::new_v4().to_string();

                let acquired = diesel::update(
                    items::table.filter(items::id.eq(&item_id)).filter(
                        items::sync_lease_token
                            .is_null()
                            .or(items::sync_lease_expires_at.is_null())
                            .or(items::sync_lease_expires_at
                                .assume_not_null()
                                .le(to_db_time(now))),
                    ),
                )
                .set((
                    items::sync_lease_token.eq(&token),
                    items::sync_lease_expires_at.eq(&expires_at),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;

                if acquired == 0 {
                    return Ok(None);
                }
                Ok(Some(SyncLease {
                    item_id,
                    token,
                    expires_at: from_db_time(&expires_at)?,
                }))
            })
            .await
    }

    async fn release_sync_lease(&self, lease: SyncLease) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let released = diesel::update(
                    items::table
                        .filter(items::id.eq(&lease.item_id))
                        .filter(items::sync_lease_token.eq(&lease.token)),
                )
                .set((
                    items::sync_lease_token.eq(None::<String>),
                    items::sync_lease_expires_at.eq(None::<String>),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                if released == 0 {
                    debug!(
                        "[Items] Lease on item {} was already taken over",
                        lease.item_id
                    );
                }
                Ok(())
            })
            .await
    }

    async fn record_webhook_received(
        &self,
        item_id: String,
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(items::table.find(item_id))
                    .set(items::last_webhook_at.eq(to_db_time(received_at)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}
