//! Normalization of provider records into the pipeline invoice shape.

use chrono::NaiveDate;
use tracing::debug;

use invoiceflow_protocol::dates::{normalize_date_label, parse_date_label};
use invoiceflow_protocol::Invoice;

/// Parse a textual EUR amount (`"19,99 €"`, `"1 234,50€"`) to a number.
/// French decimal commas and grouping spaces (including narrow no-break
/// spaces) are handled.
pub fn parse_amount_text(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '€' | ' ' | '\u{a0}' | '\u{202f}'))
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Normalize one fetched batch: ISO dates (drop what cannot be parsed),
/// numeric amounts, from-date filter, cap, source tag.
pub(crate) fn normalize_batch(
    raw: Vec<Invoice>,
    source_name: &str,
    from_date: Option<NaiveDate>,
    max_results: u32,
) -> Vec<Invoice> {
    let mut invoices = Vec::with_capacity(raw.len());
    for mut invoice in raw {
        let Some(iso) = normalize_date_label(&invoice.date) else {
            debug!(
                source = source_name,
                date = %invoice.date,
                "dropping invoice with unparseable date"
            );
            continue;
        };
        if let Some(cutoff) = from_date {
            // normalize_date_label only returns labels parse_date_label accepts.
            let Some(parsed) = parse_date_label(&iso) else {
                continue;
            };
            if parsed < cutoff {
                continue;
            }
        }
        invoice.date = iso;
        if invoice.amount_eur.is_none() {
            invoice.amount_eur = invoice.amount_text.as_deref().and_then(parse_amount_text);
        }
        invoice.source = Some(source_name.to_string());
        invoices.push(invoice);
        if invoices.len() as u32 >= max_results {
            break;
        }
    }
    invoices
}
