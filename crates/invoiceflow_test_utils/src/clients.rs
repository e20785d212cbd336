//! In-memory drive and accounting clients.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use invoiceflow_exports::{
    AccountingClient, AccountingYear, DriveClient, JournalEntry, NewTransaction,
};

/// Folder tree keyed by slash-joined folder ids; uploads are recorded, not
/// stored.
#[derive(Default)]
pub struct MemoryDrive {
    files: Mutex<HashMap<String, HashMap<String, String>>>,
    next_id: Mutex<u64>,
}

impl MemoryDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_file(&self, folder_id: &str, name: &str, file_id: &str) {
        self.files
            .lock()
            .unwrap()
            .entry(folder_id.to_string())
            .or_default()
            .insert(name.to_string(), file_id.to_string());
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().unwrap().values().map(HashMap::len).sum()
    }
}

#[async_trait]
impl DriveClient for MemoryDrive {
    async fn ensure_folder_path(
        &self,
        parent: Option<&str>,
        folders: &[String],
    ) -> anyhow::Result<String> {
        let mut id = parent.unwrap_or("root").to_string();
        for folder in folders {
            id = format!("{id}/{folder}");
        }
        Ok(id)
    }

    async fn find_file(&self, folder_id: &str, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .get(folder_id)
            .and_then(|files| files.get(name))
            .cloned())
    }

    async fn upload_file(
        &self,
        folder_id: &str,
        name: &str,
        _local_path: &Path,
    ) -> anyhow::Result<String> {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let file_id = format!("drive-file-{next}");
        self.seed_file(folder_id, name, &file_id);
        Ok(file_id)
    }

    async fn share_file(&self, _file_id: &str, _email: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Single accounting year covering 2020-2030, with a seedable journal.
#[derive(Default)]
pub struct MemoryAccounting {
    journal: Mutex<Vec<JournalEntry>>,
    created: Mutex<Vec<NewTransaction>>,
}

impl MemoryAccounting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_journal_entry(&self, date: &str, label: &str) {
        self.journal.lock().unwrap().push(JournalEntry {
            date: date.to_string(),
            label: label.to_string(),
        });
    }

    pub fn created_transactions(&self) -> Vec<NewTransaction> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountingClient for MemoryAccounting {
    async fn accounting_years(&self) -> anyhow::Result<Vec<AccountingYear>> {
        Ok(vec![AccountingYear {
            id: 1,
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
        }])
    }

    async fn account_journal(
        &self,
        _year_id: i64,
        _account_code: &str,
    ) -> anyhow::Result<Vec<JournalEntry>> {
        Ok(self.journal.lock().unwrap().clone())
    }

    async fn create_transaction(&self, transaction: NewTransaction) -> anyhow::Result<String> {
        let mut created = self.created.lock().unwrap();
        created.push(transaction.clone());
        self.journal.lock().unwrap().push(JournalEntry {
            date: transaction.date.clone(),
            label: transaction.label.clone(),
        });
        Ok(format!("tx-{}", created.len()))
    }
}
