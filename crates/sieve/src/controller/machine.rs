//! The collection controller as a synchronous state machine.
//!
//! [`Controller::handle`] applies one command and returns the [`Effect`]s the
//! runtime must carry out: queries to execute, bulk actions to run, events
//! to deliver. Results come back through [`Controller::complete`] and
//! [`Controller::bulk_completed`]. Every dispatched query gets a new
//! generation number and only the latest generation's result is applied.

use crate::bulk::BulkAction;
use crate::error::BulkError;
use crate::filter::{FilterMap, FormPayload};
use crate::pagination::{Page, PageInfo, PaginationMode, PaginationState};
use crate::query::{ActorContext, Query, QueryAssembler};
use crate::sort::{self, SortSpec};
use crate::url::{self, DecodedState, UrlCodec, UrlParams};

use super::command::{Command, HostEvent, RowMatcher};
use super::state::{Snapshot, Status, ViewState};

/// Per-collection controller behaviour.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub mode: PaginationMode,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Sizes offered to the user. Other sizes up to the maximum are accepted.
    pub page_size_options: Vec<u32>,
    pub id_field: String,
    /// Applied on mount when the URL carries no filters.
    pub default_filters: FilterMap,
    /// Initial sort; the base query's own ordering when empty.
    pub default_sort: SortSpec,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            mode: PaginationMode::Offset,
            default_page_size: 25,
            max_page_size: crate::query::assembler::DEFAULT_MAX_PAGE_SIZE,
            page_size_options: vec![10, 25, 50, 100],
            id_field: "id".to_string(),
            default_filters: FilterMap::new(),
            default_sort: SortSpec::new(),
        }
    }
}

/// Work the runtime performs on the controller's behalf.
#[derive(Debug, Clone)]
pub enum Effect {
    Execute {
        generation: u64,
        query: Query,
    },
    RunBulk {
        action: BulkAction,
        base: Query,
        id_field: String,
        ids: Vec<String>,
    },
    Notify(HostEvent),
}

/// Owns the view state of one collection.
#[derive(Debug)]
pub struct Controller {
    settings: ControllerSettings,
    assembler: QueryAssembler,
    url: UrlCodec,
    base: Query,
    view: ViewState,
    page: Page,
    status: Status,
    generation: u64,
    /// The user has clicked a sort header this session.
    sort_touched: bool,
    /// The current sort is the initial default, untouched by the user.
    sort_from_default: bool,
    bulk_running: bool,
    /// Last URL parameters seen from or sent to the host.
    host_params: UrlParams,
    mounted: bool,
}

impl Controller {
    /// Initial state from defaults, then URL overrides.
    pub fn new(
        settings: ControllerSettings,
        assembler: QueryAssembler,
        url: UrlCodec,
        base: Query,
        params: UrlParams,
    ) -> Self {
        let pagination = PaginationState::start(settings.mode, settings.default_page_size);
        let mut view = ViewState::new(pagination, settings.id_field.clone());
        view.filters = settings.default_filters.clone();
        view.sort = if settings.default_sort.is_empty() {
            base.default_sort()
        } else {
            settings.default_sort.clone()
        };

        let mut controller = Self {
            sort_from_default: !view.sort.is_empty(),
            settings,
            assembler,
            url,
            base,
            view,
            page: Page::empty(),
            status: Status::Idle { has_data: false },
            generation: 0,
            sort_touched: false,
            bulk_running: false,
            host_params: UrlParams::new(),
            mounted: true,
        };

        let decoded = controller.url.decode(&params);
        let url_has_filters = params.iter().any(|(k, _)| {
            controller.assembler.fields().is_filterable(k)
        });
        let filters = if url_has_filters {
            decoded.filters.clone()
        } else {
            controller.view.filters.clone()
        };
        controller.view = controller.view_from_url(decoded, filters);
        controller.host_params = params;
        controller
    }

    /// First load.
    pub fn mount(&mut self) -> Vec<Effect> {
        self.reload()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn base(&self) -> &Query {
        &self.base
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            view: self.view.clone(),
            page: self.page.clone(),
            page_info: PageInfo::new(&self.view.pagination, &self.page),
            status: self.status.clone(),
            bulk_running: self.bulk_running,
        }
    }

    /// The query the current state produces.
    pub fn current_query(&self) -> Query {
        let mut base = self.base.clone();
        if !self.view.search.is_empty() {
            base = base.search(self.view.search.clone());
        }
        // An untouched default that mirrors the base ordering is left to the
        // base query, so custom ordering expressions survive.
        let sort = if self.sort_from_default && self.view.sort == self.base.default_sort() {
            SortSpec::new()
        } else {
            self.view.sort.clone()
        };
        self.assembler
            .assemble(base, &self.view.filters, &sort, &self.view.pagination)
    }

    /// URL parameters for the current state merged over the host's own.
    pub fn url_params(&self) -> UrlParams {
        let mut view = self.view.clone();
        if self.sort_from_default {
            view.sort = SortSpec::new();
        }
        self.url.merge(&self.host_params, &view)
    }

    pub fn handle(&mut self, command: Command) -> Vec<Effect> {
        if !self.mounted {
            tracing::debug!(command = ?command, "controller unmounted; ignoring command");
            return Vec::new();
        }

        match command {
            Command::FilterChanged(form) => self.filter_changed(&form),
            Command::SearchChanged(term) => self.search_changed(&term),
            Command::ClearFilter(field) => {
                if self.view.filters.remove(&field).is_none() {
                    return Vec::new();
                }
                self.restart()
            }
            Command::ClearAllFilters => {
                if self.view.filters.is_empty() {
                    return Vec::new();
                }
                self.view.filters.clear();
                self.restart()
            }
            Command::ToggleSort { field, additive } => self.toggle_sort(&field, additive),
            Command::GotoPage(page) => self.goto_page(page),
            Command::NextPage => self.step_page(true),
            Command::PrevPage => self.step_page(false),
            Command::SetPageSize(size) => self.set_page_size(size),
            Command::ToggleRow(id) => {
                self.view.selection.toggle(&id);
                self.selection_changed()
            }
            Command::ToggleSelectAllOnPage => {
                let ids = self.page.ids(&self.settings.id_field);
                self.view.selection.toggle_all(&ids);
                self.selection_changed()
            }
            Command::ClearSelection => {
                if self.view.selection.is_empty() {
                    return Vec::new();
                }
                self.view.selection.clear();
                self.selection_changed()
            }
            Command::RunBulkAction(action) => self.run_bulk(action),
            Command::Refresh => self.reload(),
            Command::ItemUpdated { id, patch } => {
                let id_field = self.settings.id_field.clone();
                self.patch_rows(&RowMatcher::new(move |row| {
                    row.id(&id_field).as_deref() == Some(id.as_str())
                }), &patch)
            }
            Command::ItemsUpdated { ids, patch } => {
                let id_field = self.settings.id_field.clone();
                self.patch_rows(
                    &RowMatcher::new(move |row| row.id(&id_field).is_some_and(|id| ids.contains(&id))),
                    &patch,
                )
            }
            Command::ItemsUpdatedWhere { matcher, patch } => self.patch_rows(&matcher, &patch),
            Command::SetQueryable(query) => self.set_queryable(query),
            Command::SetActor(actor) => self.set_actor(actor),
            Command::UrlChanged(params) => self.url_changed(params),
            Command::Unmount => {
                tracing::debug!("controller unmounted");
                self.mounted = false;
                Vec::new()
            }
        }
    }

    /// Apply a query result. Results of superseded queries are dropped.
    pub fn complete(&mut self, generation: u64, result: Result<Page, String>) -> Vec<Effect> {
        if !self.mounted {
            return Vec::new();
        }
        if generation != self.generation {
            tracing::debug!(
                generation,
                current = self.generation,
                "discarding stale query result"
            );
            return Vec::new();
        }

        let mut effects = Vec::new();
        match result {
            Ok(page) => {
                effects.push(Effect::Notify(HostEvent::Loaded {
                    rows: page.rows.len(),
                }));
                self.page = page;
                self.status = Status::Idle { has_data: true };
            }
            Err(message) => {
                tracing::error!(error = %message, "collection query failed");
                self.page = Page::empty();
                self.status = Status::Error {
                    message: message.clone(),
                };
                effects.push(Effect::Notify(HostEvent::LoadFailed { message }));
            }
        }

        let params = self.url_params();
        if params != self.host_params {
            self.host_params = params.clone();
            effects.push(Effect::Notify(HostEvent::UrlChanged(params)));
        }
        effects
    }

    /// Apply the outcome of a bulk action.
    pub fn bulk_completed(
        &mut self,
        action: &str,
        result: Result<serde_json::Value, BulkError>,
    ) -> Vec<Effect> {
        self.bulk_running = false;
        if !self.mounted {
            return Vec::new();
        }
        match result {
            Ok(value) => {
                self.view.selection.clear();
                let mut effects = vec![
                    Effect::Notify(HostEvent::BulkActionSucceeded {
                        action: action.to_string(),
                        result: value,
                    }),
                    Effect::Notify(HostEvent::SelectionChanged { count: 0 }),
                ];
                effects.extend(self.reload());
                effects
            }
            Err(err) => {
                tracing::warn!(action, error = %err, "bulk action failed");
                vec![Effect::Notify(HostEvent::BulkActionFailed {
                    action: action.to_string(),
                    message: err.to_string(),
                })]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Handlers
    // -----------------------------------------------------------------------

    fn reload(&mut self) -> Vec<Effect> {
        self.generation += 1;
        self.status = Status::Loading;
        vec![Effect::Execute {
            generation: self.generation,
            query: self.current_query(),
        }]
    }

    /// Back to the first page, then reload.
    fn restart(&mut self) -> Vec<Effect> {
        self.view.pagination = self.view.pagination.reset();
        self.reload()
    }

    fn filter_changed(&mut self, form: &FormPayload) -> Vec<Effect> {
        let metas = self.assembler.fields().filter_metas();
        let filters = self.assembler.registry().parse_form(&metas, form);
        let search = form
            .get(url::SEARCH)
            .map_or_else(|| self.view.search.clone(), |s| s.trim().to_string());

        if filters == self.view.filters && search == self.view.search {
            return Vec::new();
        }
        self.view.filters = filters;
        self.view.search = search;
        self.restart()
    }

    fn search_changed(&mut self, term: &str) -> Vec<Effect> {
        let term = term.trim();
        if term == self.view.search {
            return Vec::new();
        }
        self.view.search = term.to_string();
        self.restart()
    }

    fn toggle_sort(&mut self, field: &str, additive: bool) -> Vec<Effect> {
        if !self.assembler.fields().is_sortable(field) {
            tracing::warn!(field, "sort toggle on unknown or non-sortable field; ignoring");
            return Vec::new();
        }
        let cycle = self.assembler.fields().sort_cycle(field);
        let next = sort::toggle(
            &self.view.sort,
            field,
            &cycle,
            self.sort_from_default && !self.sort_touched,
            additive,
        );
        if next == self.view.sort {
            return Vec::new();
        }
        self.sort_touched = true;
        self.sort_from_default = false;
        self.view.sort = next;
        self.restart()
    }

    /// Requesting the current page reloads it.
    fn goto_page(&mut self, page: u32) -> Vec<Effect> {
        let PaginationState::Offset { page_size, .. } = self.view.pagination else {
            tracing::debug!("goto page ignored in keyset mode");
            return Vec::new();
        };
        let page = page.max(1);
        self.view.pagination = PaginationState::Offset {
            current_page: page,
            page_size,
        };
        self.reload()
    }

    fn step_page(&mut self, forward: bool) -> Vec<Effect> {
        let PaginationState::Keyset { page_size, .. } = self.view.pagination else {
            tracing::debug!("next/prev page ignored in offset mode");
            return Vec::new();
        };
        let cursor = if forward {
            self.page.last_cursor()
        } else {
            self.page.first_cursor()
        };
        let Some(cursor) = cursor else {
            tracing::debug!(forward, "no edge cursor on the displayed page");
            return Vec::new();
        };
        self.view.pagination = if forward {
            PaginationState::Keyset {
                after: Some(cursor),
                before: None,
                page_size,
            }
        } else {
            PaginationState::Keyset {
                after: None,
                before: Some(cursor),
                page_size,
            }
        };
        self.reload()
    }

    fn clamp_page_size(&self, size: u32) -> u32 {
        if size > self.settings.max_page_size {
            tracing::warn!(
                requested = size,
                max = self.settings.max_page_size,
                "page size exceeds maximum, capping"
            );
            return self.settings.max_page_size;
        }
        if !self.settings.page_size_options.is_empty()
            && !self.settings.page_size_options.contains(&size)
        {
            tracing::debug!(page_size = size, "page size is not one of the offered options");
        }
        size
    }

    fn set_page_size(&mut self, size: u32) -> Vec<Effect> {
        if size == 0 {
            tracing::debug!("page size 0 ignored");
            return Vec::new();
        }
        let size = self.clamp_page_size(size);
        if size == self.view.pagination.page_size() {
            return Vec::new();
        }
        self.view.pagination = self.view.pagination.with_page_size(size);
        self.reload()
    }

    fn selection_changed(&self) -> Vec<Effect> {
        vec![Effect::Notify(HostEvent::SelectionChanged {
            count: self.view.selection.len(),
        })]
    }

    fn run_bulk(&mut self, action: BulkAction) -> Vec<Effect> {
        let rejection = if self.bulk_running {
            Some(BulkError::AlreadyRunning)
        } else if self.view.selection.is_empty() {
            Some(BulkError::EmptySelection)
        } else {
            None
        };
        if let Some(err) = rejection {
            tracing::warn!(action = action.name(), error = %err, "bulk action rejected");
            return vec![Effect::Notify(HostEvent::BulkActionFailed {
                action: action.name().to_string(),
                message: err.to_string(),
            })];
        }

        self.bulk_running = true;
        vec![Effect::RunBulk {
            action,
            base: self.base.clone(),
            id_field: self.settings.id_field.clone(),
            ids: self.view.selection.ids(),
        }]
    }

    fn patch_rows(&mut self, matcher: &RowMatcher, patch: &serde_json::Value) -> Vec<Effect> {
        let mut patched = 0usize;
        for row in self.page.rows.iter_mut().filter(|r| matcher.matches(r)) {
            if row.merge(patch) {
                patched += 1;
            }
        }
        tracing::debug!(patched, "patched displayed rows");
        Vec::new()
    }

    fn set_queryable(&mut self, query: Query) -> Vec<Effect> {
        if query == self.base {
            return Vec::new();
        }
        if self.sort_from_default && self.settings.default_sort.is_empty() {
            self.view.sort = query.default_sort();
            self.sort_from_default = !self.view.sort.is_empty();
        }
        self.base = query;
        self.restart()
    }

    fn set_actor(&mut self, actor: ActorContext) -> Vec<Effect> {
        if self.base.actor() == &actor {
            return Vec::new();
        }
        self.base = self.base.clone().for_actor(actor);
        self.restart()
    }

    fn url_changed(&mut self, params: UrlParams) -> Vec<Effect> {
        let decoded = self.url.decode(&params);
        let filters = decoded.filters.clone();
        let next = self.view_from_url(decoded, filters);
        self.host_params = params;

        if next.same_query_as(&self.view) {
            return Vec::new();
        }
        self.view = next;
        self.reload()
    }

    /// View state for decoded URL values, applying sort precedence: a
    /// non-empty URL sort wins; otherwise a user who has touched sorting gets
    /// no sort; otherwise the current sort stays.
    fn view_from_url(&mut self, decoded: DecodedState, filters: FilterMap) -> ViewState {
        let page_size = decoded
            .page_size
            .map(|size| self.clamp_page_size(size))
            .unwrap_or(self.settings.default_page_size);
        let decoded = DecodedState {
            page_size: Some(page_size),
            ..decoded
        };

        let sort = if !decoded.sort.is_empty() {
            if decoded.sort != self.view.sort {
                self.sort_from_default = false;
            }
            decoded.sort.clone()
        } else if self.sort_touched {
            self.sort_from_default = false;
            SortSpec::new()
        } else {
            self.view.sort.clone()
        };

        ViewState {
            filters,
            sort,
            pagination: decoded.pagination(self.settings.mode, self.settings.default_page_size),
            search: decoded.search,
            selection: self.view.selection.clone(),
        }
    }
}
