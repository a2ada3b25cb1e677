use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::debug;
use uuid::Uuid;

use northstar_core::transactions::{
    AppliedPage, LedgerPage, LedgerRepositoryTrait, LedgerTransaction,
};
use northstar_core::Result;

use super::model::TransactionDB;
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::{accounts, transactions};
use crate::utils::to_db_time;

pub struct LedgerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// Provider account id to local account id, for accounts owned by `item_id`.
fn item_account_ids(
    conn: &mut SqliteConnection,
    item_id: &str,
) -> Result<HashMap<String, String>> {
    let rows = accounts::table
        .filter(accounts::item_id.eq(item_id))
        .select((accounts::plaid_account_id, accounts::id))
        .load::<(String, String)>(conn)
        .map_err(StorageError::from)?;
    Ok(rows.into_iter().collect())
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    fn get_transaction(&self, provider_transaction_id: &str) -> Result<Option<LedgerTransaction>> {
        let mut conn = get_connection(&self.pool)?;
        transactions::table
            .filter(transactions::provider_transaction_id.eq(provider_transaction_id))
            .select(TransactionDB::as_select())
            .first::<TransactionDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?
            .map(LedgerTransaction::try_from)
            .transpose()
    }

    fn list_item_transactions(&self, item_id: &str) -> Result<Vec<LedgerTransaction>> {
        let mut conn = get_connection(&self.pool)?;
        transactions::table
            .filter(transactions::item_id.eq(item_id))
            .order((
                transactions::posted_date.desc(),
                transactions::provider_transaction_id.asc(),
            ))
            .select(TransactionDB::as_select())
            .load::<TransactionDB>(&mut conn)
            .map_err(StorageError::from)?
            .into_iter()
            .map(LedgerTransaction::try_from)
            .collect()
    }

    async fn apply_sync_page(&self, page: LedgerPage) -> Result<AppliedPage> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<AppliedPage> {
                let now = to_db_time(Utc::now());
                let account_ids = item_account_ids(conn, &page.item_id)?;
                let mut applied = AppliedPage::default();

                for row in page.added.into_iter().chain(page.modified) {
                    let Some(account_id) = account_ids.get(&row.provider_account_id) else {
                        debug!(
                            "[Ledger] Skipping {} for unknown account {}",
                            row.provider_transaction_id, row.provider_account_id
                        );
                        applied.skipped += 1;
                        continue;
                    };

                    let record = TransactionDB {
                        id: Uuid::new_v4().to_string(),
                        user_id: page.user_id.clone(),
                        item_id: page.item_id.clone(),
                        account_id: account_id.clone(),
                        provider_transaction_id: row.provider_transaction_id,
                        pending_transaction_id: row.pending_transaction_id,
                        amount_cents: row.amount_cents,
                        currency: row.currency,
                        merchant_name: row.merchant_name,
                        name: row.name,
                        authorized_date: row.authorized_date,
                        posted_date: row.posted_date,
                        pending: row.pending,
                        hash_fingerprint: row.hash_fingerprint,
                        removed_at: None,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };

                    // Re-adding a tombstoned row revives it.
                    applied.upserted += diesel::insert_into(transactions::table)
                        .values(&record)
                        .on_conflict(transactions::provider_transaction_id)
                        .do_update()
                        .set((
                            transactions::user_id.eq(&record.user_id),
                            transactions::item_id.eq(&record.item_id),
                            transactions::account_id.eq(&record.account_id),
                            transactions::pending_transaction_id
                                .eq(record.pending_transaction_id.clone()),
                            transactions::amount_cents.eq(record.amount_cents),
                            transactions::currency.eq(&record.currency),
                            transactions::merchant_name.eq(record.merchant_name.clone()),
                            transactions::name.eq(&record.name),
                            transactions::authorized_date.eq(record.authorized_date.clone()),
                            transactions::posted_date.eq(record.posted_date.clone()),
                            transactions::pending.eq(record.pending),
                            transactions::hash_fingerprint.eq(&record.hash_fingerprint),
                            transactions::removed_at.eq(None::<String>),
                            transactions::updated_at.eq(&now),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }

                if !page.removed.is_empty() {
                    applied.tombstoned = diesel::update(
                        transactions::table
                            .filter(transactions::item_id.eq(&page.item_id))
                            .filter(transactions::provider_transaction_id.eq_any(&page.removed)),
                    )
                    .set((
                        transactions::removed_at.eq(Some(now.clone())),
                        transactions::updated_at.eq(&now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                }

                Ok(applied)
            })
            .await
    }
}
