//! Scripted source runner.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use invoiceflow_protocol::Invoice;
use invoiceflow_sources::SourceRunner;
use invoiceflow_store::Source;

enum Script {
    Invoices(Vec<Invoice>),
    Fail(String),
    /// Sleep before returning; used to drive deadline tests.
    Slow(Duration, Vec<Invoice>),
}

/// Returns whatever was scripted for a source name; unscripted sources
/// yield an empty batch. Records how often each source ran.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: Mutex<HashMap<String, Script>>,
    runs: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returns(&self, source_name: &str, invoices: Vec<Invoice>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_name.to_string(), Script::Invoices(invoices));
    }

    pub fn fails(&self, source_name: &str, error: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_name.to_string(), Script::Fail(error.to_string()));
    }

    pub fn slow(&self, source_name: &str, delay: Duration, invoices: Vec<Invoice>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(source_name.to_string(), Script::Slow(delay, invoices));
    }

    pub fn run_count(&self, source_name: &str) -> usize {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|name| name.as_str() == source_name)
            .count()
    }
}

enum Action {
    Empty,
    Invoices(Vec<Invoice>),
    Fail(String),
    Slow(Duration, Vec<Invoice>),
}

#[async_trait]
impl SourceRunner for ScriptedSource {
    async fn run(
        &self,
        source: &Source,
        _from_date: Option<NaiveDate>,
        _max_results: u32,
    ) -> anyhow::Result<Vec<Invoice>> {
        self.runs.lock().unwrap().push(source.name.clone());
        // Copy the script out before awaiting; the guard must not cross.
        let action = {
            let scripts = self.scripts.lock().unwrap();
            match scripts.get(&source.name) {
                None => Action::Empty,
                Some(Script::Invoices(invoices)) => Action::Invoices(invoices.clone()),
                Some(Script::Fail(error)) => Action::Fail(error.clone()),
                Some(Script::Slow(delay, invoices)) => Action::Slow(*delay, invoices.clone()),
            }
        };
        match action {
            Action::Empty => Ok(Vec::new()),
            Action::Invoices(invoices) => Ok(invoices),
            Action::Fail(error) => anyhow::bail!("{error}"),
            Action::Slow(delay, invoices) => {
                tokio::time::sleep(delay).await;
                Ok(invoices)
            }
        }
    }
}

/// A plausible normalized invoice for tests.
pub fn sample_invoice(invoice_id: &str, date: &str, amount: f64, file_path: &str) -> Invoice {
    Invoice {
        date: date.to_string(),
        invoice_id: Some(invoice_id.to_string()),
        amount_eur: Some(amount),
        amount_text: None,
        file_path: Some(file_path.to_string()),
        download_url: None,
        source: None,
    }
}
