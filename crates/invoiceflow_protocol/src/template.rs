//! Path and label template rendering.
//!
//! Templates use `{variable}` placeholders drawn from a closed set. A
//! template is validated before any side effect; rendering an unknown or
//! valueless placeholder is an error, never a silent pass-through.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dates::{french_month_name, parse_date_label, quarter_for_month};

/// The closed variable set templates may reference.
pub const TEMPLATE_VARIABLES: [&str; 9] = [
    "year",
    "month",
    "month_name",
    "quarter",
    "date",
    "invoice_id",
    "source",
    "amount",
    "filename",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template cannot be empty")]
    Empty,
    #[error("Template must contain at least one variable")]
    NoVariables,
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Missing value for template variable '{0}'")]
    MissingValue(String),
    #[error("Unbalanced braces in template")]
    UnbalancedBraces,
}

/// Variables derived from one invoice, used to render destination paths and
/// accounting labels. Persisted verbatim into `export_history.context`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateContext {
    #[serde(default)]
    pub invoice_id: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub amount_eur: Option<f64>,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub month: Option<String>,
    #[serde(default)]
    pub month_name: Option<String>,
    #[serde(default)]
    pub quarter: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl TemplateContext {
    /// Build a context from the invoice essentials, deriving the calendar
    /// variables from the date when it parses.
    pub fn build(
        invoice_id: Option<String>,
        date: Option<String>,
        amount_eur: Option<f64>,
        source: Option<String>,
    ) -> Self {
        let mut ctx = Self {
            invoice_id,
            amount_eur,
            source,
            ..Default::default()
        };
        if let Some(date) = date {
            if let Some(parsed) = parse_date_label(&date) {
                use chrono::Datelike;
                ctx.year = Some(format!("{:04}", parsed.year()));
                ctx.month = Some(format!("{:02}", parsed.month()));
                ctx.month_name = french_month_name(parsed.month()).map(str::to_string);
                ctx.quarter = Some(quarter_for_month(parsed.month()).to_string());
            }
            ctx.date = Some(date);
        }
        ctx
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Fields every export handler requires before doing anything.
    pub fn is_complete(&self) -> bool {
        self.invoice_id.is_some() && self.date.is_some() && self.amount_eur.is_some()
    }

    fn value(&self, variable: &str) -> Option<String> {
        match variable {
            "year" => self.year.clone(),
            "month" => self.month.clone(),
            "month_name" => self.month_name.clone(),
            "quarter" => self.quarter.clone(),
            "date" => self.date.clone(),
            "invoice_id" => self.invoice_id.clone(),
            "source" => self.source.clone(),
            "amount" => self.amount_eur.map(|a| format!("{a:.2}")),
            "filename" => self.filename.clone(),
            _ => None,
        }
    }
}

/// Check a template against the closed variable set without rendering it.
pub fn validate_template(template: &str) -> Result<(), TemplateError> {
    let variables = placeholders(template)?;
    if variables.is_empty() {
        return Err(TemplateError::NoVariables);
    }
    for variable in variables {
        if !TEMPLATE_VARIABLES.contains(&variable.as_str()) {
            return Err(TemplateError::UnknownVariable(variable));
        }
    }
    Ok(())
}

/// Render `template` against `context`.
pub fn render_template(
    template: &str,
    context: &TemplateContext,
) -> Result<String, TemplateError> {
    if template.is_empty() {
        return Err(TemplateError::Empty);
    }
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '{' {
            if ch == '}' {
                return Err(TemplateError::UnbalancedBraces);
            }
            out.push(ch);
            continue;
        }
        let mut name = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                _ => return Err(TemplateError::UnbalancedBraces),
            }
        }
        if !TEMPLATE_VARIABLES.contains(&name.as_str()) {
            return Err(TemplateError::UnknownVariable(name));
        }
        match context.value(&name) {
            Some(value) => out.push_str(&value),
            None => return Err(TemplateError::MissingValue(name)),
        }
    }
    Ok(out)
}

fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    if template.is_empty() {
        return Err(TemplateError::Empty);
    }
    let mut found = Vec::new();
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '{' {
            continue;
        }
        let mut name = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                _ => return Err(TemplateError::UnbalancedBraces),
            }
        }
        found.push(name);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TemplateContext {
        TemplateContext::build(
            Some("INV-001".into()),
            Some("2025-01-15".into()),
            Some(99.99),
            Some("Portal".into()),
        )
    }

    #[test]
    fn derives_calendar_variables_from_date() {
        let ctx = ctx();
        assert_eq!(ctx.year.as_deref(), Some("2025"));
        assert_eq!(ctx.month.as_deref(), Some("01"));
        assert_eq!(ctx.month_name.as_deref(), Some("Janvier"));
        assert_eq!(ctx.quarter.as_deref(), Some("Q1"));
    }

    #[test]
    fn renders_path_template() {
        let rendered =
            render_template("{year}/{month}/{source}_{invoice_id}.pdf", &ctx()).unwrap();
        assert_eq!(rendered, "2025/01/Portal_INV-001.pdf");
    }

    #[test]
    fn renders_amount_to_two_decimals() {
        let rendered = render_template("{invoice_id} {amount}", &ctx()).unwrap();
        assert_eq!(rendered, "INV-001 99.99");
    }

    #[test]
    fn unknown_variable_is_rejected() {
        assert_eq!(
            validate_template("{year}/{invalid_var}.pdf"),
            Err(TemplateError::UnknownVariable("invalid_var".into()))
        );
        assert!(matches!(
            render_template("{bogus}", &ctx()),
            Err(TemplateError::UnknownVariable(_))
        ));
    }

    #[test]
    fn empty_and_literal_templates_are_rejected() {
        assert_eq!(validate_template(""), Err(TemplateError::Empty));
        assert_eq!(
            validate_template("static/path.pdf"),
            Err(TemplateError::NoVariables)
        );
    }

    #[test]
    fn missing_value_is_an_error() {
        let ctx = TemplateContext::build(Some("INV-1".into()), None, Some(1.0), None);
        assert_eq!(
            render_template("{year}/{invoice_id}", &ctx),
            Err(TemplateError::MissingValue("year".into()))
        );
    }

    #[test]
    fn filename_variable_renders() {
        let ctx = ctx().with_filename("facture.pdf");
        assert_eq!(
            render_template("{year}/{filename}", &ctx).unwrap(),
            "2025/facture.pdf"
        );
    }

    #[test]
    fn month_name_template_renders_french() {
        let rendered = render_template("{year}/{month_name}/{date}_{invoice_id}.pdf", &ctx())
            .unwrap();
        assert_eq!(rendered, "2025/Janvier/2025-01-15_INV-001.pdf");
    }
}
