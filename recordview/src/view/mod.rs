use crate::accessor::{Field, FieldAccessors};
use crate::error::{RecordViewError, Result};
use crate::export::{self, CsvExporter, ExportRow};
use crate::filter::{self, FilterRule};
use crate::pager::{self, Page, PageInfo, PageSpec};
use crate::schema::{check_definition, ViewDefinition};
use crate::selection::{RecordId, SelectionTracker};
use crate::sort::{self, SortSpec};
use crate::store::RecordStore;
use crate::value::Value;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::mem;
use std::str::FromStr;
use std::sync::Arc;

/// Lifecycle of the controller. `Recomputing` only spans the inside of a
/// transition, so callers and listeners always see `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Idle,
    Recomputing,
}

/// Change notifications delivered to subscribers after each operation
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    /// The visible result was recomputed
    ResultChanged(PageInfo),
    /// The page index was moved to keep it inside the result
    PageClamped { requested: usize, effective: usize },
    SelectionChanged { selected: usize },
    RecordsReplaced { version: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Which records an export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportScope {
    /// Selected records that are visible, in view order
    #[default]
    Selected,
    /// The whole filtered and sorted result
    Filtered,
    CurrentPage,
}

impl FromStr for ExportScope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "selected" | "selection" => Ok(ExportScope::Selected),
            "filtered" | "all" => Ok(ExportScope::Filtered),
            "page" | "current_page" => Ok(ExportScope::CurrentPage),
            other => Err(format!(
                "Invalid export scope '{other}' (expected selected, filtered or page)"
            )),
        }
    }
}

/// The committed filter, sort and page state of a view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewQuery {
    pub rules: Vec<FilterRule>,
    pub sort: Option<SortSpec>,
    pub page: PageSpec,
}

impl ViewQuery {
    /// Set a rule, replacing any rule of the same kind on the same field.
    /// Rules of other kinds on that field are kept and still AND together.
    fn upsert_rule(&mut self, rule: FilterRule) {
        let same_slot = |r: &FilterRule| {
            r.field() == rule.field() && mem::discriminant(r) == mem::discriminant(&rule)
        };
        match self.rules.iter().position(same_slot) {
            Some(pos) => {
                let mut index = 0;
                self.rules.retain(|r| {
                    let keep = index <= pos || !same_slot(r);
                    index += 1;
                    keep
                });
                self.rules[pos] = rule;
            }
            None => self.rules.push(rule),
        }
    }
}

/// A distinct value of a field and how many records carry it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetValue {
    pub value: Value,
    pub count: usize,
}

/// How the page index is carried across a recomputation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexPolicy {
    /// Explicit page request: out-of-range indices clamp to the last page
    Clamp,
    /// Filter, sort or data change: keep the index if still valid, else page 0
    KeepOrFirst,
}

type Listener = Box<dyn FnMut(&ViewEvent)>;

/// Composes filtering, sorting, paging, selection and export over one record
/// store for a single view session.
pub struct ViewController<T> {
    store: RecordStore<T>,
    accessors: FieldAccessors<T>,
    id_field: Field<T>,
    query: ViewQuery,
    selection: SelectionTracker,
    /// Store rows of the filtered, sorted result
    ordered: Vec<usize>,
    /// Ids of `ordered`, for selection checks and pruning
    visible: HashSet<RecordId>,
    prune_pending: bool,
    info: PageInfo,
    state: ViewState,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl<T> ViewController<T> {
    /// Create a view over `store`. `id_field` names the accessor that
    /// identifies records for selection.
    pub fn new(
        store: RecordStore<T>,
        accessors: FieldAccessors<T>,
        id_field: &str,
        page_size: usize,
    ) -> Result<Self> {
        let id_field = accessors.require(id_field)?.clone();
        let page = PageSpec::first(page_size)?;
        let mut view = ViewController {
            store,
            accessors,
            id_field,
            query: ViewQuery {
                rules: Vec::new(),
                sort: None,
                page,
            },
            selection: SelectionTracker::new(),
            ordered: Vec::new(),
            visible: HashSet::new(),
            prune_pending: false,
            info: PageInfo::compute(0, page),
            state: ViewState::Idle,
            listeners: Vec::new(),
            next_subscription: 0,
        };
        let query = view.query.clone();
        view.transition(query, IndexPolicy::Clamp)?;
        Ok(view)
    }

    // ── Query state ─────────────────────────────────────────────────

    /// Add a rule, or replace the rule of the same kind on the same field.
    pub fn set_filter_rule(&mut self, rule: FilterRule) -> Result<()> {
        let mut query = self.query.clone();
        query.upsert_rule(rule);
        self.transition(query, IndexPolicy::KeepOrFirst)
    }

    /// Replace the whole rule set. Every rule is kept and they AND together.
    pub fn set_filter_rules(&mut self, rules: Vec<FilterRule>) -> Result<()> {
        let mut query = self.query.clone();
        query.rules = rules;
        self.transition(query, IndexPolicy::KeepOrFirst)
    }

    /// Drop every rule on `field`. Returns whether any existed.
    pub fn remove_filter(&mut self, field: &str) -> Result<bool> {
        let mut query = self.query.clone();
        let before = query.rules.len();
        query.rules.retain(|r| r.field() != field);
        if query.rules.len() == before {
            return Ok(false);
        }
        self.transition(query, IndexPolicy::KeepOrFirst)?;
        Ok(true)
    }

    pub fn clear_filters(&mut self) -> Result<()> {
        self.set_filter_rules(Vec::new())
    }

    pub fn set_sort_spec(&mut self, spec: Option<SortSpec>) -> Result<()> {
        let mut query = self.query.clone();
        query.sort = spec;
        self.transition(query, IndexPolicy::KeepOrFirst)
    }

    /// Column-header click on `field`
    pub fn toggle_sort(&mut self, field: &str) -> Result<()> {
        let spec = SortSpec::toggled_for(self.query.sort.as_ref(), field);
        self.set_sort_spec(Some(spec))
    }

    /// Request a page; an index past the end is served as the last page.
    pub fn set_page_spec(&mut self, page: PageSpec) -> Result<()> {
        let mut query = self.query.clone();
        query.page = page;
        self.transition(query, IndexPolicy::Clamp)
    }

    pub fn set_page_index(&mut self, index: usize) -> Result<()> {
        self.set_page_spec(self.query.page.with_index(index))
    }

    /// Change page density. Always returns to the first page.
    pub fn set_page_size(&mut self, size: usize) -> Result<()> {
        let page = PageSpec::first(size)?;
        self.set_page_spec(page)
    }

    pub fn next_page(&mut self) -> Result<()> {
        self.set_page_index(self.info.page_index + 1)
    }

    pub fn previous_page(&mut self) -> Result<()> {
        self.set_page_index(self.info.page_index.saturating_sub(1))
    }

    /// Swap the source collection. The whole pipeline reruns against the new
    /// version; selection of records that disappear is pruned.
    pub fn replace_records(&mut self, records: impl Into<Arc<[T]>>) -> Result<()> {
        let version = self.store.replace(records);
        let query = self.query.clone();
        self.transition(query, IndexPolicy::KeepOrFirst)?;
        self.emit(ViewEvent::RecordsReplaced { version });
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Rows of the current page plus pagination metadata
    pub fn page(&self) -> Page<&T> {
        let records = self.store.records();
        pager::paginate(&self.ordered, self.query.page).map(|row| &records[row])
    }

    pub fn page_info(&self) -> PageInfo {
        self.info
    }

    /// The full filtered and sorted result
    pub fn filtered(&self) -> Vec<&T> {
        let records = self.store.records();
        self.ordered.iter().map(|&row| &records[row]).collect()
    }

    pub fn total_count(&self) -> usize {
        self.ordered.len()
    }

    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn filter_rules(&self) -> &[FilterRule] {
        &self.query.rules
    }

    pub fn sort_spec(&self) -> Option<&SortSpec> {
        self.query.sort.as_ref()
    }

    pub fn page_spec(&self) -> PageSpec {
        self.query.page
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Version of the underlying record store
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    pub fn store(&self) -> &RecordStore<T> {
        &self.store
    }

    pub fn accessors(&self) -> &FieldAccessors<T> {
        &self.accessors
    }

    pub fn record_id(&self, record: &T) -> RecordId {
        RecordId::from(self.id_field.value(record))
    }

    /// Distinct non-null values of `field` across the whole store, in sort order.
    pub fn facet_values(&self, field: &str) -> Result<Vec<FacetValue>> {
        let field = self.accessors.require(field)?;
        let mut facets: BTreeMap<String, FacetValue> = BTreeMap::new();
        for record in self.store.records() {
            let value = field.value(record);
            if value.is_null() {
                continue;
            }
            facets
                .entry(value.to_string())
                .or_insert_with(|| FacetValue { value, count: 0 })
                .count += 1;
        }
        let mut values: Vec<FacetValue> = facets.into_values().collect();
        values.sort_by(|a, b| a.value.sort_cmp(&b.value));
        Ok(values)
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Flip selection of a visible record. Ids not in the current result are
    /// ignored. Returns whether the id is selected afterwards.
    pub fn toggle_selection(&mut self, id: impl Into<RecordId>) -> bool {
        let id = id.into();
        self.settle_selection();
        if !self.visible.contains(&id) {
            log::debug!("Ignoring selection toggle for hidden record {id}");
            return false;
        }
        let selected = self.selection.toggle(id);
        self.emit_selection();
        selected
    }

    pub fn deselect(&mut self, id: impl Into<RecordId>) -> bool {
        let id = id.into();
        self.settle_selection();
        let removed = self.selection.deselect(&id);
        if removed {
            self.emit_selection();
        }
        removed
    }

    /// Select the given ids; ids outside the current result are skipped.
    pub fn select_all<I>(&mut self, ids: I)
    where
        I: IntoIterator,
        I::Item: Into<RecordId>,
    {
        self.settle_selection();
        let visible = &self.visible;
        self.selection.select_all(
            ids.into_iter()
                .map(Into::into)
                .filter(|id| visible.contains(id)),
        );
        self.emit_selection();
    }

    /// Select every row on the current page
    pub fn select_page(&mut self) {
        let ids: Vec<RecordId> = self
            .page()
            .rows
            .into_iter()
            .map(|r| self.record_id(r))
            .collect();
        self.select_all(ids);
    }

    /// Select the entire filtered result, including rows on other pages
    pub fn select_all_filtered(&mut self) {
        self.settle_selection();
        self.selection.select_all(self.visible.iter().cloned());
        self.emit_selection();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.prune_pending = false;
        self.emit_selection();
    }

    pub fn is_selected(&self, id: &RecordId) -> bool {
        self.selection.is_selected(id) && self.visible.contains(id)
    }

    /// Selected ids still visible through the current filter
    pub fn selected_ids(&self) -> Vec<RecordId> {
        self.selection
            .selected_ids()
            .iter()
            .filter(|id| self.visible.contains(*id))
            .cloned()
            .collect()
    }

    pub fn selected_count(&self) -> usize {
        self.selection
            .selected_ids()
            .iter()
            .filter(|id| self.visible.contains(*id))
            .count()
    }

    /// Selected records in view order
    pub fn selected_records(&self) -> Vec<&T> {
        let records = self.store.records();
        self.ordered
            .iter()
            .map(|&row| &records[row])
            .filter(|record| self.selection.is_selected(&self.record_id(record)))
            .collect()
    }

    // ── Export ──────────────────────────────────────────────────────

    pub fn export_records(&self, scope: ExportScope) -> Vec<&T> {
        match scope {
            ExportScope::Selected => self.selected_records(),
            ExportScope::Filtered => self.filtered(),
            ExportScope::CurrentPage => self.page().rows,
        }
    }

    /// CSV for `scope` over the named columns; all columns when `columns` is empty.
    pub fn export_csv(&self, scope: ExportScope, columns: &[&str]) -> Result<String> {
        self.export_csv_with(scope, columns, &CsvExporter::default())
    }

    pub fn export_csv_with(
        &self,
        scope: ExportScope,
        columns: &[&str],
        exporter: &CsvExporter,
    ) -> Result<String> {
        let columns = self.resolve_columns(columns)?;
        exporter.serialize(self.export_records(scope), &columns)
    }

    pub fn export_rows(&self, scope: ExportScope, columns: &[&str]) -> Result<Vec<ExportRow>> {
        let columns = self.resolve_columns(columns)?;
        Ok(export::rows(self.export_records(scope), &columns))
    }

    fn resolve_columns(&self, names: &[&str]) -> Result<Vec<Field<T>>> {
        if names.is_empty() {
            Ok(self.accessors.fields().to_vec())
        } else {
            self.accessors.columns(names)
        }
    }

    // ── Notifications ───────────────────────────────────────────────

    /// Register a callback for view events
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&ViewEvent) + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: ViewEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    fn emit_selection(&mut self) {
        let selected = self.selected_count();
        self.emit(ViewEvent::SelectionChanged { selected });
    }

    // ── Pipeline ────────────────────────────────────────────────────

    /// Validate `query`, run filter → sort → pager, and commit. On error the
    /// previous state is untouched and no events fire.
    fn transition(&mut self, query: ViewQuery, policy: IndexPolicy) -> Result<()> {
        filter::validate_all(&query.rules, &self.accessors)?;
        if let Some(spec) = &query.sort {
            spec.validate(&self.accessors)?;
        }
        if query.page.size() == 0 {
            return Err(RecordViewError::InvalidPageSize(0));
        }
        let selected_before = self.selected_count();

        self.state = ViewState::Recomputing;
        let rows = match self.run_pipeline(&query) {
            Ok(rows) => rows,
            Err(e) => {
                self.state = ViewState::Idle;
                return Err(e);
            }
        };
        let mut events = Vec::new();
        if let Some(dropped) = self.settle_selection() {
            log::debug!("Pruned {dropped} hidden records from selection");
        }

        let requested = query.page.index();
        let page_count = pager::page_count(rows.len(), query.page.size());
        let index = match policy {
            IndexPolicy::Clamp => requested.min(page_count - 1),
            IndexPolicy::KeepOrFirst if requested < page_count => requested,
            IndexPolicy::KeepOrFirst => 0,
        };
        let page = query.page.with_index(index);
        let info = PageInfo::compute(rows.len(), page);
        if info.page_index != requested {
            events.push(ViewEvent::PageClamped {
                requested,
                effective: info.page_index,
            });
        }

        let visible: HashSet<RecordId> = {
            let records = self.store.records();
            rows.iter()
                .map(|&row| self.record_id(&records[row]))
                .collect()
        };
        log::debug!(
            "View recomputed: {} of {} records match, page {}/{}",
            rows.len(),
            self.store.len(),
            info.page_index + 1,
            info.page_count
        );

        self.query = ViewQuery { page, ..query };
        self.ordered = rows;
        self.visible = visible;
        self.prune_pending = true;
        self.info = info;
        self.state = ViewState::Idle;

        let selected = self.selected_count();
        if selected != selected_before {
            events.push(ViewEvent::SelectionChanged { selected });
        }
        events.push(ViewEvent::ResultChanged(info));
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    fn run_pipeline(&self, query: &ViewQuery) -> Result<Vec<usize>> {
        let records = self.store.records();
        let mut rows = filter::matching_rows(records, &query.rules, &self.accessors)?;
        sort::sort_rows(&mut rows, records, query.sort.as_ref(), &self.accessors)?;
        Ok(rows)
    }

    /// Apply a deferred prune: drop selected ids that the last committed
    /// result no longer shows. Returns how many were dropped, if any.
    fn settle_selection(&mut self) -> Option<usize> {
        if !self.prune_pending {
            return None;
        }
        self.prune_pending = false;
        let visible = &self.visible;
        let dropped = self.selection.retain(|id| visible.contains(id));
        (dropped > 0).then_some(dropped)
    }
}

impl ViewController<serde_json::Value> {
    /// Build a view over JSON records from a YAML view definition, applying
    /// its default filters and sort.
    pub fn from_definition(
        definition: &ViewDefinition,
        records: Vec<serde_json::Value>,
    ) -> Result<Self> {
        check_definition(definition)?;
        let mut view = ViewController::new(
            RecordStore::new(records),
            definition.accessors(),
            &definition.id_field,
            definition.page_size,
        )?;
        view.set_filter_rules(definition.filters.clone())?;
        view.set_sort_spec(definition.sort.clone())?;
        Ok(view)
    }
}

impl<T> fmt::Debug for ViewController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewController")
            .field("version", &self.store.version())
            .field("query", &self.query)
            .field("info", &self.info)
            .field("selected", &self.selection.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordViewError;
    use crate::schema::parse_view_definition_str;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone)]
    struct Transaction {
        id: String,
        status: &'static str,
        amount: f64,
        method: &'static str,
    }

    fn tx(n: u32, status: &'static str, amount: f64, method: &'static str) -> Transaction {
        Transaction {
            id: format!("TX-{n:02}"),
            status,
            amount,
            method,
        }
    }

    fn transactions() -> Vec<Transaction> {
        vec![
            tx(1, "completed", 1500.0, "M-Pesa"),
            tx(2, "pending", 950.0, "Card"),
            tx(3, "completed", 3200.0, "Insurance"),
            tx(4, "failed", 400.0, "M-Pesa"),
            tx(5, "pending", 2750.0, "Cash"),
            tx(6, "completed", 800.0, "Cash"),
            tx(7, "refunded", 1200.0, "Card"),
            tx(8, "completed", 4500.0, "M-Pesa"),
            tx(9, "pending", 600.0, "Insurance"),
            tx(10, "failed", 3000.0, "Card"),
            tx(11, "completed", 2100.0, "Card"),
            tx(12, "pending", 1800.0, "M-Pesa"),
        ]
    }

    fn accessors() -> FieldAccessors<Transaction> {
        FieldAccessors::new()
            .with_labeled_field("id", "Transaction ID", |t: &Transaction| t.id.as_str().into())
            .with_labeled_field("status", "Status", |t: &Transaction| t.status.into())
            .with_labeled_field("amount", "Amount", |t: &Transaction| t.amount.into())
            .with_labeled_field("method", "Payment Method", |t: &Transaction| t.method.into())
    }

    fn view(page_size: usize) -> ViewController<Transaction> {
        ViewController::new(RecordStore::new(transactions()), accessors(), "id", page_size).unwrap()
    }

    fn page_ids(view: &ViewController<Transaction>) -> Vec<String> {
        view.page().rows.iter().map(|t| t.id.clone()).collect()
    }

    fn record_events(view: &mut ViewController<Transaction>) -> Rc<RefCell<Vec<ViewEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        view.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        events
    }

    #[test]
    fn test_initial_view_is_first_page_in_input_order() {
        let v = view(5);
        assert_eq!(v.state(), ViewState::Idle);
        assert_eq!(page_ids(&v), vec!["TX-01", "TX-02", "TX-03", "TX-04", "TX-05"]);
        assert_eq!(v.page_info().page_count, 3);
        assert_eq!(v.total_count(), 12);
    }

    #[test]
    fn test_completed_by_amount_desc_scenario() {
        let mut v = view(3);
        v.set_filter_rule(FilterRule::equals("status", "completed")).unwrap();
        v.set_sort_spec(Some(SortSpec::descending("amount"))).unwrap();

        let info = v.page_info();
        assert_eq!(info.total_count, 5);
        assert_eq!(info.page_count, 2);
        assert_eq!(page_ids(&v), vec!["TX-08", "TX-03", "TX-11"]);

        v.next_page().unwrap();
        assert_eq!(page_ids(&v), vec!["TX-01", "TX-06"]);
        assert_eq!(v.page_info().page_index, 1);
    }

    #[test]
    fn test_page_size_change_resets_index() {
        let many: Vec<Transaction> = (1..=35).map(|n| tx(n, "pending", n as f64, "Cash")).collect();
        let mut v = ViewController::new(RecordStore::new(many), accessors(), "id", 10).unwrap();
        v.set_page_index(3).unwrap();
        assert_eq!(v.page_info().page_index, 3);
        assert_eq!(v.page_info().page_count, 4);

        v.set_page_size(5).unwrap();
        assert_eq!(v.page_info().page_index, 0);
        assert_eq!(v.page_info().page_count, 7);
        assert_eq!(v.page_spec().size(), 5);
    }

    #[test]
    fn test_search_matches_hyphenated_method() {
        let mut v = view(10);
        v.set_filter_rule(FilterRule::contains("method", "mpesa")).unwrap();
        assert_eq!(page_ids(&v), vec!["TX-01", "TX-04", "TX-08", "TX-12"]);
    }

    #[test]
    fn test_filter_keeps_valid_index_and_snaps_otherwise() {
        let mut v = view(3);
        v.set_page_index(1).unwrap();
        let events = record_events(&mut v);

        // 5 completed -> 2 pages, index 1 still valid
        v.set_filter_rule(FilterRule::equals("status", "completed")).unwrap();
        assert_eq!(v.page_info().page_index, 1);

        // 2 failed -> 1 page, index snaps to 0
        v.set_filter_rule(FilterRule::equals("status", "failed")).unwrap();
        assert_eq!(v.page_info().page_index, 0);
        assert_eq!(v.page_spec().index(), 0);
        assert!(events
            .borrow()
            .contains(&ViewEvent::PageClamped { requested: 1, effective: 0 }));
    }

    #[test]
    fn test_explicit_page_request_clamps_to_last() {
        let mut v = view(5);
        let events = record_events(&mut v);
        v.set_page_index(10).unwrap();
        assert_eq!(v.page_info().page_index, 2);
        assert_eq!(page_ids(&v), vec!["TX-11", "TX-12"]);
        assert_eq!(
            events.borrow()[0],
            ViewEvent::PageClamped { requested: 10, effective: 2 }
        );
    }

    #[test]
    fn test_one_rule_per_field() {
        let mut v = view(10);
        v.set_filter_rule(FilterRule::equals("status", "pending")).unwrap();
        v.set_filter_rule(FilterRule::equals("status", "failed")).unwrap();
        assert_eq!(v.filter_rules().len(), 1);
        assert_eq!(v.total_count(), 2);

        assert!(v.remove_filter("status").unwrap());
        assert!(!v.remove_filter("status").unwrap());
        assert_eq!(v.total_count(), 12);
    }

    #[test]
    fn test_rejected_changes_keep_last_good_state() {
        let mut v = view(4);
        v.set_filter_rule(FilterRule::equals("status", "pending")).unwrap();
        v.set_page_index(1).unwrap();
        let before_query = v.query().clone();
        let before_info = v.page_info();
        let events = record_events(&mut v);

        let err = v.set_filter_rule(FilterRule::equals("ward", "B")).unwrap_err();
        assert!(matches!(err, RecordViewError::UnknownField(_)));
        let err = v.set_sort_spec(Some(SortSpec::ascending("ward"))).unwrap_err();
        assert!(matches!(err, RecordViewError::UnknownField(_)));
        let err = v.set_page_size(0).unwrap_err();
        assert!(matches!(err, RecordViewError::InvalidPageSize(0)));

        assert_eq!(v.query(), &before_query);
        assert_eq!(v.page_info(), before_info);
        assert!(events.borrow().is_empty());
        assert_eq!(v.state(), ViewState::Idle);
    }

    #[test]
    fn test_deserialized_zero_page_size_never_reaches_view() {
        let mut v = view(4);
        assert!(serde_json::from_str::<PageSpec>(r#"{"size":0,"index":0}"#).is_err());

        let spec: PageSpec = serde_json::from_str(r#"{"size":5,"index":2}"#).unwrap();
        v.set_page_spec(spec).unwrap();
        assert_eq!(v.page_info().page_index, 2);
        assert_eq!(v.page_spec().size(), 5);
    }

    #[test]
    fn test_selection_event_follows_visible_count() {
        let mut v = view(10);
        v.select_all(["TX-01", "TX-02"]);
        let events = record_events(&mut v);

        v.set_filter_rule(FilterRule::equals("status", "pending")).unwrap();
        assert_eq!(v.selected_count(), 1);
        assert_eq!(
            events.borrow().clone(),
            vec![
                ViewEvent::SelectionChanged { selected: 1 },
                ViewEvent::ResultChanged(v.page_info()),
            ]
        );

        events.borrow_mut().clear();
        v.set_filter_rule(FilterRule::equals("status", "failed")).unwrap();
        assert_eq!(v.selected_count(), 0);
        assert_eq!(
            events.borrow().clone(),
            vec![
                ViewEvent::SelectionChanged { selected: 0 },
                ViewEvent::ResultChanged(v.page_info()),
            ]
        );

        events.borrow_mut().clear();
        v.set_sort_spec(Some(SortSpec::descending("amount"))).unwrap();
        assert_eq!(
            events.borrow().clone(),
            vec![ViewEvent::ResultChanged(v.page_info())]
        );
    }

    #[test]
    fn test_rules_on_same_field_and_together() {
        let records = transactions();
        let rules = vec![
            FilterRule::in_set("method", ["Cash", "M-Pesa"]),
            FilterRule::contains("method", "card"),
        ];
        let expected = filter::apply(records.iter(), &rules, &accessors()).unwrap().len();
        assert_eq!(expected, 0);

        let mut v = view(10);
        v.set_filter_rules(rules).unwrap();
        assert_eq!(v.filter_rules().len(), 2);
        assert_eq!(v.total_count(), expected);

        // same kind on the same field replaces, other kinds stay
        v.set_filter_rule(FilterRule::contains("method", "pesa")).unwrap();
        assert_eq!(v.filter_rules().len(), 2);
        assert_eq!(page_ids(&v), vec!["TX-01", "TX-04", "TX-08", "TX-12"]);

        v.set_filter_rule(FilterRule::in_set("method", ["Cash"])).unwrap();
        assert_eq!(v.filter_rules().len(), 2);
        assert_eq!(v.total_count(), 0);

        assert!(v.remove_filter("method").unwrap());
        assert!(v.filter_rules().is_empty());
        assert_eq!(v.total_count(), 12);
    }

    #[test]
    fn test_unknown_id_field_rejected() {
        let result = ViewController::new(RecordStore::new(transactions()), accessors(), "uuid", 10);
        assert!(matches!(result, Err(RecordViewError::UnknownField(_))));
    }

    #[test]
    fn test_select_all_is_page_scoped() {
        let mut v = view(5);
        v.select_page();
        assert_eq!(v.selected_count(), 5);
        assert!(v.is_selected(&"TX-05".into()));
        assert!(!v.is_selected(&"TX-06".into()));

        v.select_all_filtered();
        assert_eq!(v.selected_count(), 12);
    }

    #[test]
    fn test_selection_survives_sort_and_page_changes() {
        let mut v = view(3);
        v.set_filter_rule(FilterRule::equals("status", "completed")).unwrap();
        assert!(v.toggle_selection("TX-01"));
        assert!(v.toggle_selection("TX-03"));

        v.set_sort_spec(Some(SortSpec::ascending("amount"))).unwrap();
        v.set_page_index(1).unwrap();
        v.set_filter_rule(FilterRule::contains("method", "")).unwrap();
        assert_eq!(v.selected_ids(), vec![RecordId::new("TX-01"), RecordId::new("TX-03")]);
    }

    #[test]
    fn test_hidden_selection_is_not_restored() {
        let mut v = view(10);
        v.toggle_selection("TX-01");
        v.toggle_selection("TX-02");

        v.set_filter_rule(FilterRule::equals("status", "pending")).unwrap();
        assert_eq!(v.selected_ids(), vec![RecordId::new("TX-02")]);
        assert!(!v.is_selected(&"TX-01".into()));

        v.remove_filter("status").unwrap();
        assert_eq!(v.selected_ids(), vec![RecordId::new("TX-02")]);
    }

    #[test]
    fn test_toggle_ignores_hidden_records() {
        let mut v = view(10);
        v.set_filter_rule(FilterRule::equals("status", "failed")).unwrap();
        assert!(!v.toggle_selection("TX-01"));
        assert_eq!(v.selected_count(), 0);
        v.select_all(["TX-04", "TX-05", "TX-10"]);
        assert_eq!(v.selected_ids(), vec![RecordId::new("TX-04"), RecordId::new("TX-10")]);
    }

    #[test]
    fn test_replace_records_prunes_and_bumps_version() {
        let mut v = view(5);
        v.select_all(["TX-01", "TX-12"]);
        let events = record_events(&mut v);

        let remaining: Vec<Transaction> = transactions().into_iter().take(6).collect();
        v.replace_records(remaining).unwrap();
        assert_eq!(v.version(), 1);
        assert_eq!(v.total_count(), 6);
        assert_eq!(v.selected_ids(), vec![RecordId::new("TX-01")]);
        assert_eq!(
            events.borrow().last(),
            Some(&ViewEvent::RecordsReplaced { version: 1 })
        );
    }

    #[test]
    fn test_export_scopes() {
        let mut v = view(2);
        v.set_filter_rule(FilterRule::equals("method", "Cash")).unwrap();
        v.set_sort_spec(Some(SortSpec::descending("amount"))).unwrap();
        v.toggle_selection("TX-06");

        let selected = v.export_csv(ExportScope::Selected, &["id", "amount"]).unwrap();
        assert_eq!(selected, "Transaction ID,Amount\nTX-06,800\n");

        let filtered = v.export_csv(ExportScope::Filtered, &["id"]).unwrap();
        assert_eq!(filtered, "Transaction ID\nTX-05\nTX-06\n");

        let all_columns = v.export_csv(ExportScope::CurrentPage, &[]).unwrap();
        assert_eq!(
            all_columns.lines().next(),
            Some("Transaction ID,Status,Amount,Payment Method")
        );
        assert!(v.export_csv(ExportScope::Filtered, &["ward"]).is_err());

        let rows = v.export_rows(ExportScope::Filtered, &["id", "status"]).unwrap();
        assert_eq!(rows[0].get("Status"), Some("pending"));
    }

    #[test]
    fn test_facet_values() {
        let v = view(10);
        let facets = v.facet_values("status").unwrap();
        let summary: Vec<(String, usize)> = facets
            .iter()
            .map(|f| (f.value.to_string(), f.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("completed".to_string(), 5),
                ("failed".to_string(), 2),
                ("pending".to_string(), 4),
                ("refunded".to_string(), 1),
            ]
        );
        assert!(v.facet_values("ward").is_err());
    }

    #[test]
    fn test_toggle_sort_and_events() {
        let mut v = view(12);
        let events = record_events(&mut v);
        v.toggle_sort("amount").unwrap();
        assert_eq!(page_ids(&v)[0], "TX-04");
        v.toggle_sort("amount").unwrap();
        assert_eq!(page_ids(&v)[0], "TX-08");
        assert_eq!(events.borrow().len(), 2);
        assert!(matches!(events.borrow()[1], ViewEvent::ResultChanged(_)));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let mut v = view(5);
        let count = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&count);
        let id = v.subscribe(move |_| *sink.borrow_mut() += 1);
        v.next_page().unwrap();
        assert!(v.unsubscribe(id));
        v.next_page().unwrap();
        assert_eq!(*count.borrow(), 1);
        assert!(!v.unsubscribe(id));
    }

    #[test]
    fn test_pages_cover_filtered_result() {
        let mut v = view(4);
        v.set_filter_rule(FilterRule::in_set("method", ["Card", "M-Pesa"])).unwrap();
        v.set_sort_spec(Some(SortSpec::ascending("amount"))).unwrap();
        let full: Vec<String> = v.filtered().iter().map(|t| t.id.clone()).collect();
        let mut joined = Vec::new();
        for index in 0..v.page_info().page_count {
            v.set_page_index(index).unwrap();
            joined.extend(page_ids(&v));
        }
        assert_eq!(joined, full);
    }

    #[test]
    fn test_from_definition_applies_defaults() {
        let definition = parse_view_definition_str(
            r#"
id_field: id
page_size: 2
columns:
  - { field: id }
  - { field: patient, path: patient.name, label: Patient }
  - { field: date, type: date }
  - { field: department }
sort: { field: date, direction: desc }
filters:
  - { op: equals, field: department, value: Cardiology }
"#,
        )
        .unwrap();
        let records = vec![
            serde_json::json!({"id": "AP-1", "patient": {"name": "Kamau"}, "date": "2024-03-01", "department": "Cardiology"}),
            serde_json::json!({"id": "AP-2", "patient": {"name": "Njeri"}, "date": "2024-03-05", "department": "Neurology"}),
            serde_json::json!({"id": "AP-3", "patient": {"name": "Ouma"}, "date": "2024-03-09", "department": "Cardiology"}),
        ];
        let v = ViewController::from_definition(&definition, records).unwrap();
        let ids: Vec<String> = v
            .page()
            .rows
            .iter()
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["AP-3", "AP-1"]);
        let csv = v.export_csv(ExportScope::Filtered, &["id", "patient"]).unwrap();
        assert_eq!(csv, "id,Patient\nAP-3,Ouma\nAP-1,Kamau\n");
    }
}
