use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::currency::{BASE_CURRENCY, Currency, ExchangeRates, format_amount};
use crate::remote::{LedgerStore, RATES_SOURCE_NAME, RemoteError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpenseCategory {
    pub id: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
}

pub const EXPENSE_CATEGORIES: [ExpenseCategory; 7] = [
    ExpenseCategory { id: "food", label: "Food", emoji: "🍱" },
    ExpenseCategory { id: "transport", label: "Transport", emoji: "🚃" },
    ExpenseCategory { id: "entertainment", label: "Entertainment", emoji: "🎡" },
    ExpenseCategory { id: "accommodation", label: "Accommodation", emoji: "🏡" },
    ExpenseCategory { id: "souvenir", label: "Souvenirs", emoji: "🎁" },
    ExpenseCategory { id: "daily", label: "Daily goods", emoji: "🛒" },
    ExpenseCategory { id: "medicine", label: "Medicine", emoji: "💊" },
];

pub fn category_info(id: &str) -> Option<&'static ExpenseCategory> {
    EXPENSE_CATEGORIES.iter().find(|category| category.id == id)
}

/// One row of the remote ledger table. Prices are whole base-currency units.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExpenseRecord {
    #[serde(deserialize_with = "deserialize_record_id")]
    pub id: String,
    pub purchase_date: NaiveDate,
    pub product_name: String,
    pub category: String,
    pub price: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn deserialize_record_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(value) => value,
        RawId::Number(value) => value.to_string(),
    })
}

/// Validated payload sent to the store on create and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseFields {
    pub purchase_date: NaiveDate,
    pub product_name: String,
    pub category: String,
    pub price: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormField {
    PurchaseDate,
    ItemName,
    Category,
    Price,
}

impl FormField {
    pub fn tag(self) -> &'static str {
        match self {
            FormField::PurchaseDate => "selectedDate",
            FormField::ItemName => "itemName",
            FormField::Category => "category",
            FormField::Price => "price",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {}", field_list(.fields))]
pub struct ValidationError {
    pub fields: Vec<FormField>,
}

impl ValidationError {
    #[cfg(test)]
    pub fn has(&self, field: FormField) -> bool {
        self.fields.contains(&field)
    }
}

fn field_list(fields: &[FormField]) -> String {
    fields
        .iter()
        .map(|field| field.tag())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Raw form input, exactly as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub purchase_date: String,
    pub product_name: String,
    pub category: String,
    pub price: String,
}

impl ExpenseDraft {
    pub fn from_record(record: &ExpenseRecord) -> Self {
        Self {
            purchase_date: record.purchase_date.format("%Y-%m-%d").to_string(),
            product_name: record.product_name.clone(),
            category: record.category.clone(),
            price: record.price.to_string(),
        }
    }

    pub fn validate(&self) -> Result<ExpenseFields, ValidationError> {
        let mut fields = Vec::new();

        let purchase_date = NaiveDate::parse_from_str(self.purchase_date.trim(), "%Y-%m-%d").ok();
        if purchase_date.is_none() {
            fields.push(FormField::PurchaseDate);
        }

        let product_name = self.product_name.trim();
        if product_name.is_empty() {
            fields.push(FormField::ItemName);
        }

        if category_info(self.category.trim()).is_none() {
            fields.push(FormField::Category);
        }

        let price = self.price.trim().parse::<u64>().ok().filter(|price| *price > 0);
        if price.is_none() {
            fields.push(FormField::Price);
        }

        match (purchase_date, price) {
            (Some(purchase_date), Some(price)) if fields.is_empty() => Ok(ExpenseFields {
                purchase_date,
                product_name: product_name.to_string(),
                category: self.category.trim().to_string(),
                price,
            }),
            _ => Err(ValidationError { fields }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl Display for MutationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MutationKind::Create => "add",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        })
    }
}

#[derive(Debug, Error)]
pub enum SubmitFailure {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("record {id} is not in the local list")]
    NotCached { id: String },
    #[error("no expense selected")]
    NothingSelected,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to load expenses: {0}")]
    Load(#[source] RemoteError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("failed to {kind} expense: {source}")]
    Submit {
        kind: MutationKind,
        #[source]
        source: SubmitFailure,
    },
    #[error("failed to fetch exchange rates: {0}")]
    RateFetch(#[source] RemoteError),
    #[error("another change is still being saved")]
    Busy,
}

impl LedgerError {
    fn submit(kind: MutationKind, source: impl Into<SubmitFailure>) -> Self {
        LedgerError::Submit {
            kind,
            source: source.into(),
        }
    }

    /// Text for the error banner; rate failures stay silent.
    pub fn banner(&self) -> Option<String> {
        match self {
            LedgerError::Load(_) => Some("Failed to load expenses, try restarting".to_string()),
            LedgerError::Validation(err) => Some(format!("Please fix: {}", field_list(&err.fields))),
            LedgerError::Submit { kind, .. } => {
                Some(format!("Failed to {kind} expense, please try again later"))
            }
            LedgerError::RateFetch(_) => None,
            LedgerError::Busy => Some("Still saving the previous change".to_string()),
        }
    }
}

/// A store call prepared by the ledger, run wherever the caller likes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(ExpenseFields),
    Update { id: String, fields: ExpenseFields },
    Delete { id: String },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Mutation::Create(_) => MutationKind::Create,
            Mutation::Update { .. } => MutationKind::Update,
            Mutation::Delete { .. } => MutationKind::Delete,
        }
    }

    pub fn execute(self, store: &dyn LedgerStore) -> MutationResult {
        match self {
            Mutation::Create(fields) => MutationResult::Created(store.create(&fields)),
            Mutation::Update { id, fields } => {
                let result = store.update(&id, &fields);
                MutationResult::Updated { id, result }
            }
            Mutation::Delete { id } => {
                let result = store.delete(&id);
                MutationResult::Deleted { id, result }
            }
        }
    }
}

#[derive(Debug)]
pub enum MutationResult {
    Created(Result<ExpenseRecord, RemoteError>),
    Updated {
        id: String,
        result: Result<ExpenseRecord, RemoteError>,
    },
    Deleted {
        id: String,
        result: Result<(), RemoteError>,
    },
}

/// Client-side mirror of the remote ledger plus the form and view state
/// around it. The record list is patched locally after every mutation.
#[derive(Debug, Clone, Default)]
pub struct ExpenseLedger {
    records: Vec<ExpenseRecord>,
    loading: bool,
    pub form: ExpenseDraft,
    form_errors: Vec<FormField>,
    editing_id: Option<String>,
    pending_delete: Option<String>,
    filter_date: Option<NaiveDate>,
    currency: Currency,
    rates: Option<ExchangeRates>,
    rates_loading: bool,
    submitting: bool,
    banner: Option<String>,
    notice: Option<String>,
}

impl ExpenseLedger {
    /// State right after mount, with the list and rate fetches in flight.
    pub fn new() -> Self {
        Self {
            loading: true,
            rates_loading: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> &[ExpenseRecord] {
        &self.records
    }

    pub fn record(&self, id: &str) -> Option<&ExpenseRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn rates_loading(&self) -> bool {
        self.rates_loading
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    pub fn form_errors(&self) -> &[FormField] {
        &self.form_errors
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    pub fn pending_delete(&self) -> Option<&str> {
        self.pending_delete.as_deref()
    }

    pub fn apply_loaded(&mut self, result: Result<Vec<ExpenseRecord>, RemoteError>) -> Result<(), LedgerError> {
        self.loading = false;
        match result {
            Ok(records) => {
                debug!(count = records.len(), "loaded expenses");
                self.records = records;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "failed to load expenses");
                self.records.clear();
                Err(self.fail(LedgerError::Load(err)))
            }
        }
    }

    pub fn load(&mut self, store: &dyn LedgerStore) -> Result<(), LedgerError> {
        self.loading = true;
        self.apply_loaded(store.list())
    }

    pub fn apply_rates(&mut self, result: Result<ExchangeRates, RemoteError>) -> Result<(), LedgerError> {
        self.rates_loading = false;
        match result {
            Ok(rates) => {
                self.rates = Some(rates);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "exchange rates unavailable, showing base currency");
                Err(LedgerError::RateFetch(err))
            }
        }
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn set_currency(&mut self, currency: Currency) {
        self.currency = currency;
    }

    pub fn cycle_currency(&mut self) -> Currency {
        self.currency = self.currency.next();
        self.currency
    }

    pub fn display_amount(&self, amount: u64) -> String {
        format_amount(amount, self.currency, self.rates.as_ref())
    }

    /// Attribution shown under the total when a converted amount is on screen.
    pub fn rates_note(&self) -> Option<String> {
        if self.currency != BASE_CURRENCY && self.rates.is_some() {
            Some(format!("rates: {RATES_SOURCE_NAME}"))
        } else {
            None
        }
    }

    pub fn total(&self) -> u64 {
        self.records.iter().map(|record| record.price).sum()
    }

    /// Subtotals in category order, leaving out categories with nothing spent.
    pub fn category_totals(&self) -> Vec<(&'static ExpenseCategory, u64)> {
        EXPENSE_CATEGORIES
            .iter()
            .map(|category| {
                let total = self
                    .records
                    .iter()
                    .filter(|record| record.category == category.id)
                    .map(|record| record.price)
                    .sum::<u64>();
                (category, total)
            })
            .filter(|(_, total)| *total > 0)
            .collect()
    }

    pub fn expense_dates(&self) -> Vec<NaiveDate> {
        self.records
            .iter()
            .map(|record| record.purchase_date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn filter_date(&self) -> Option<NaiveDate> {
        self.filter_date
    }

    pub fn set_filter(&mut self, date: Option<NaiveDate>) {
        self.filter_date = date;
    }

    pub fn visible_records(&self) -> Vec<&ExpenseRecord> {
        self.records
            .iter()
            .filter(|record| self.filter_date.is_none_or(|date| record.purchase_date == date))
            .collect()
    }

    /// Loads a record into the form. Refused while a mutation is in flight.
    pub fn begin_edit(&mut self, id: &str) -> Result<bool, LedgerError> {
        self.ensure_idle()?;
        let Some(record) = self.record(id) else {
            return Ok(false);
        };
        self.form = ExpenseDraft::from_record(record);
        self.form_errors.clear();
        self.editing_id = Some(id.to_string());
        Ok(true)
    }

    pub fn cancel_edit(&mut self) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.leave_edit();
        Ok(())
    }

    pub fn clear_form(&mut self) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.reset_form();
        Ok(())
    }

    pub fn request_delete(&mut self, id: &str) -> Result<bool, LedgerError> {
        self.ensure_idle()?;
        if self.record(id).is_none() {
            return Ok(false);
        }
        self.pending_delete = Some(id.to_string());
        Ok(true)
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Validates the form and marks a submission in flight. The returned
    /// mutation is an update while editing, a create otherwise.
    pub fn prepare_submit(&mut self) -> Result<Mutation, LedgerError> {
        self.ensure_idle()?;
        let fields = self.validate_form()?;
        self.start_submit();
        Ok(match &self.editing_id {
            Some(id) => Mutation::Update {
                id: id.clone(),
                fields,
            },
            None => Mutation::Create(fields),
        })
    }

    /// Marks the pending delete in flight. A refusal still dismisses the
    /// confirmation.
    pub fn prepare_delete(&mut self) -> Result<Mutation, LedgerError> {
        if let Err(err) = self.ensure_idle() {
            self.pending_delete = None;
            return Err(err);
        }
        let Some(id) = self.pending_delete.clone() else {
            return Err(self.fail(LedgerError::submit(
                MutationKind::Delete,
                SubmitFailure::NothingSelected,
            )));
        };
        self.start_submit();
        Ok(Mutation::Delete { id })
    }

    /// Applies the outcome of a prepared mutation and returns a status line.
    pub fn finish(&mut self, result: MutationResult) -> Result<String, LedgerError> {
        match result {
            MutationResult::Created(result) => self
                .finish_create(result)
                .map(|record| format!("added {}", record.product_name)),
            MutationResult::Updated { id, result } => self
                .finish_update(&id, result)
                .map(|record| format!("updated {}", record.product_name)),
            MutationResult::Deleted { id, result } => self
                .finish_delete(&id, result)
                .map(|()| "expense deleted".to_string()),
        }
    }

    pub fn create(&mut self, store: &dyn LedgerStore, draft: ExpenseDraft) -> Result<ExpenseRecord, LedgerError> {
        self.ensure_idle()?;
        self.editing_id = None;
        self.form = draft;
        let fields = self.validate_form()?;
        self.start_submit();
        self.finish_create(store.create(&fields))
    }

    pub fn update(
        &mut self,
        store: &dyn LedgerStore,
        id: &str,
        draft: ExpenseDraft,
    ) -> Result<ExpenseRecord, LedgerError> {
        self.ensure_idle()?;
        self.editing_id = Some(id.to_string());
        self.form = draft;
        let fields = self.validate_form()?;
        self.start_submit();
        self.finish_update(id, store.update(id, &fields))
    }

    pub fn delete(&mut self, store: &dyn LedgerStore, id: &str) -> Result<(), LedgerError> {
        self.ensure_idle()?;
        self.pending_delete = Some(id.to_string());
        self.start_submit();
        self.finish_delete(id, store.delete(id))
    }

    fn finish_create(&mut self, result: Result<ExpenseRecord, RemoteError>) -> Result<ExpenseRecord, LedgerError> {
        self.submitting = false;
        match result {
            Ok(record) => {
                self.records.insert(0, record.clone());
                self.reset_form();
                self.notice = Some("Expense added".to_string());
                Ok(record)
            }
            Err(err) => Err(self.fail(LedgerError::submit(MutationKind::Create, err))),
        }
    }

    fn finish_update(
        &mut self,
        id: &str,
        result: Result<ExpenseRecord, RemoteError>,
    ) -> Result<ExpenseRecord, LedgerError> {
        self.submitting = false;
        let record = match result {
            Ok(record) => record,
            Err(err) => return Err(self.fail(LedgerError::submit(MutationKind::Update, err))),
        };

        let Some(slot) = self.records.iter_mut().find(|existing| existing.id == id) else {
            return Err(self.fail(LedgerError::submit(
                MutationKind::Update,
                SubmitFailure::NotCached { id: id.to_string() },
            )));
        };
        *slot = record.clone();
        self.leave_edit();
        self.notice = Some("Expense updated".to_string());
        Ok(record)
    }

    fn finish_delete(&mut self, id: &str, result: Result<(), RemoteError>) -> Result<(), LedgerError> {
        self.submitting = false;
        self.pending_delete = None;
        if let Err(err) = result {
            return Err(self.fail(LedgerError::submit(MutationKind::Delete, err)));
        }

        self.records.retain(|record| record.id != id);
        if self.editing_id.as_deref() == Some(id) {
            self.leave_edit();
        }
        Ok(())
    }

    fn leave_edit(&mut self) {
        self.editing_id = None;
        self.reset_form();
    }

    fn reset_form(&mut self) {
        self.form = ExpenseDraft::default();
        self.form_errors.clear();
    }

    fn ensure_idle(&self) -> Result<(), LedgerError> {
        if self.submitting {
            return Err(LedgerError::Busy);
        }
        Ok(())
    }

    fn start_submit(&mut self) {
        self.submitting = true;
        self.banner = None;
    }

    fn validate_form(&mut self) -> Result<ExpenseFields, LedgerError> {
        match self.form.validate() {
            Ok(fields) => {
                self.form_errors.clear();
                Ok(fields)
            }
            Err(err) => {
                self.form_errors = err.fields.clone();
                Err(LedgerError::Validation(err))
            }
        }
    }

    fn fail(&mut self, err: LedgerError) -> LedgerError {
        if let Some(banner) = err.banner() {
            self.banner = Some(banner);
        }
        err
    }
}
