//! Database models for institutions, items and accounts.

use diesel::prelude::*;

use northstar_core::items::{ConnectionHealth, Item, ItemRetryState, ItemStatus};
use northstar_core::Result;

use crate::utils::{from_db_time, from_db_time_opt};

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::institutions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InstitutionDB {
    pub id: String,
    pub plaid_institution_id: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::items)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ItemDB {
    pub id: String,
    pub user_id: String,
    pub institution_id: String,
    pub plaid_item_id: String,
    pub encrypted_access_token: String,
    pub status: String,
    pub cursor: Option<String>,
    pub failure_count: i32,
    pub next_retry_at: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub last_webhook_at: Option<String>,
    pub last_successful_sync_at: Option<String>,
    pub sync_lease_token: Option<String>,
    pub sync_lease_expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<ItemDB> for Item {
    type Error = northstar_core::Error;

    fn try_from(db: ItemDB) -> Result<Self> {
        Ok(Item {
            status: db.status.parse::<ItemStatus>()?,
            next_retry_at: from_db_time_opt(db.next_retry_at.as_deref())?,
            last_webhook_at: from_db_time_opt(db.last_webhook_at.as_deref())?,
            last_successful_sync_at: from_db_time_opt(db.last_successful_sync_at.as_deref())?,
            created_at: from_db_time(&db.created_at)?,
            updated_at: from_db_time(&db.updated_at)?,
            id: db.id,
            user_id: db.user_id,
            institution_id: db.institution_id,
            plaid_item_id: db.plaid_item_id,
            encrypted_access_token: db.encrypted_access_token,
            cursor: db.cursor,
            failure_count: db.failure_count,
            error_code: db.error_code,
            error_message: db.error_message,
        })
    }
}

impl TryFrom<&ItemDB> for ItemRetryState {
    type Error = northstar_core::Error;

    fn try_from(db: &ItemDB) -> Result<Self> {
        Ok(ItemRetryState {
            failure_count: db.failure_count,
            next_retry_at: from_db_time_opt(db.next_retry_at.as_deref())?,
            status: db.status.parse()?,
        })
    }
}

/// Item joined with its institution name, for the health listing.
pub(crate) fn connection_health(item: ItemDB, institution_name: String) -> Result<ConnectionHealth> {
    Ok(ConnectionHealth {
        status: item.status.parse()?,
        last_webhook_at: from_db_time_opt(item.last_webhook_at.as_deref())?,
        next_retry_at: from_db_time_opt(item.next_retry_at.as_deref())?,
        last_successful_sync_at: from_db_time_opt(item.last_successful_sync_at.as_deref())?,
        updated_at: from_db_time(&item.updated_at)?,
        item_id: item.id,
        plaid_item_id: item.plaid_item_id,
        institution_name,
        error_code: item.error_code,
        error_message: item.error_message,
    })
}

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::accounts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AccountDB {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub plaid_account_id: String,
    pub name: String,
    pub account_type: String,
    pub subtype: Option<String>,
    pub mask: Option<String>,
    pub current_balance_cents: Option<i64>,
    pub available_balance_cents: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}
