use diesel::prelude::*;

use northstar_core::transactions::LedgerTransaction;
use northstar_core::Result;

use crate::utils::{from_db_time, from_db_time_opt};

#[derive(Queryable, Identifiable, Insertable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::transactions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TransactionDB {
    pub id: String,
    pub user_id: String,
    pub item_id: String,
    pub account_id: String,
    pub provider_transaction_id: String,
    pub pending_transaction_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub merchant_name: Option<String>,
    pub name: String,
    pub authorized_date: Option<String>,
    pub posted_date: Option<String>,
    pub pending: bool,
    pub hash_fingerprint: String,
    pub removed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<TransactionDB> for LedgerTransaction {
    type Error = northstar_core::Error;

    fn try_from(db: TransactionDB) -> Result<Self> {
        Ok(LedgerTransaction {
            removed_at: from_db_time_opt(db.removed_at.as_deref())?,
            created_at: from_db_time(&db.created_at)?,
            updated_at: from_db_time(&db.updated_at)?,
            id: db.id,
            user_id: db.user_id,
            item_id: db.item_id,
            account_id: db.account_id,
            provider_transaction_id: db.provider_transaction_id,
            pending_transaction_id: db.pending_transaction_id,
            amount_cents: db.amount_cents,
            currency: db.currency,
            merchant_name: db.merchant_name,
            name: db.name,
            authorized_date: db.authorized_date,
            posted_date: db.posted_date,
            pending: db.pending,
            hash_fingerprint: db.hash_fingerprint,
        })
    }
}
