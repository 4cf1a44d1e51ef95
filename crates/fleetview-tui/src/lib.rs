// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use fleetview_app::validation::{
    format_date, format_datetime_minutes, format_duration_minutes, format_long_date,
    format_optional_paise, format_paise, format_time_of_day,
};
use fleetview_app::{
    AppCommand, AppEvent, AppMode, AppState, BillItem, BillItemId, BillSummary, FleetSummary,
    FormKind, FormPayload, HelpArticle, Invoice, InvoiceId, IssueId, Job, JobId, JobStatus,
    Notification, NotificationId, Product, ProductId, ProfileForm, RowAction, ScreenKind,
    SearchField, SessionUser, TableView, Trip, TripId, UserProfile, Vehicle, VehicleIssue,
    ViewError, fields_for,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use std::io;
use std::ops::Range;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::{OffsetDateTime, PrimitiveDateTime};

pub const DEFAULT_PAGE_SIZE: usize = 5;
const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const POLL_INTERVAL: Duration = Duration::from_millis(120);
const LABEL_MAX_CHARS: usize = 40;

/// Rows for one screen as loaded from the record source.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenSnapshot {
    Trips(Vec<Trip>),
    Issues(Vec<VehicleIssue>),
    Invoices(Vec<Invoice>),
    Vehicles(Vec<Vehicle>),
    Jobs(Vec<Job>),
    Billing {
        items: Vec<BillItem>,
        products: Vec<Product>,
    },
    Help(Vec<HelpArticle>),
    Notifications(Vec<Notification>),
}

impl ScreenSnapshot {
    pub const fn screen(&self) -> ScreenKind {
        match self {
            Self::Trips(_) => ScreenKind::Trips,
            Self::Issues(_) => ScreenKind::Issues,
            Self::Invoices(_) => ScreenKind::Invoices,
            Self::Vehicles(_) => ScreenKind::Vehicles,
            Self::Jobs(_) => ScreenKind::Jobs,
            Self::Billing { .. } => ScreenKind::Billing,
            Self::Help(_) => ScreenKind::Help,
            Self::Notifications(_) => ScreenKind::Notifications,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Trips(rows) => rows.len(),
            Self::Issues(rows) => rows.len(),
            Self::Invoices(rows) => rows.len(),
            Self::Vehicles(rows) => rows.len(),
            Self::Jobs(rows) => rows.len(),
            Self::Billing { items, .. } => items.len(),
            Self::Help(rows) => rows.len(),
            Self::Notifications(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Record a row action applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTarget {
    Trip(TripId),
    Issue(IssueId),
    Invoice(InvoiceId),
    Job(JobId),
    BillItem(BillItemId),
    Notification(NotificationId),
}

pub trait AppRuntime {
    fn load_summary(&mut self) -> Result<FleetSummary>;
    fn load_screen(&mut self, screen: ScreenKind) -> Result<ScreenSnapshot>;
    fn load_profile(&mut self) -> Result<Option<UserProfile>>;
    fn submit_form(&mut self, payload: &FormPayload) -> Result<()>;
    fn apply_row_action(&mut self, target: RowTarget, action: RowAction) -> Result<()>;
    fn add_product_to_bill(&mut self, product: ProductId) -> Result<()>;

    /// Pulls remote records into the local store and returns a summary line.
    fn sync_remote(&mut self) -> Result<String> {
        bail!("remote sync is not configured -- set [api] enabled = true in the config and retry")
    }

    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    fn now(&self) -> PrimitiveDateTime {
        let now = OffsetDateTime::now_utc();
        PrimitiveDateTime::new(now.date(), now.time())
    }
}

struct ScreenBinding<R> {
    columns: &'static [&'static str],
    search: fn() -> Vec<SearchField<R>>,
    row: fn(&R, PrimitiveDateTime) -> Vec<String>,
    detail: fn(&R, PrimitiveDateTime) -> Vec<(&'static str, String)>,
    label: fn(&R) -> String,
    target: fn(&R) -> Option<RowTarget>,
    extract: fn(ScreenSnapshot) -> Option<Vec<R>>,
}

struct ScreenTable<R> {
    screen: ScreenKind,
    view: TableView<R>,
    binding: ScreenBinding<R>,
}

impl<R> ScreenTable<R> {
    fn new(
        screen: ScreenKind,
        records: Vec<R>,
        page_size: usize,
        binding: ScreenBinding<R>,
    ) -> Result<Self, ViewError> {
        let view = TableView::new(records, page_size, (binding.search)())?;
        Ok(Self { screen, view, binding })
    }
}

/// Object-safe face of a screen's table so the view can hold any record type.
trait PagedScreen {
    fn screen(&self) -> ScreenKind;
    fn columns(&self) -> &'static [&'static str];
    fn len(&self) -> usize;
    fn filtered_len(&self) -> usize;
    fn page_number(&self) -> usize;
    fn page_count(&self) -> usize;
    fn page_range(&self) -> Range<usize>;
    fn filter_query(&self) -> &str;
    fn set_filter_query(&mut self, query: &str);
    fn advance(&mut self) -> bool;
    fn retreat(&mut self) -> bool;
    fn page_rows(&self, now: PrimitiveDateTime) -> Vec<Vec<String>>;
    fn selected_detail(&self) -> Option<usize>;
    fn selected_action(&self) -> Option<usize>;
    fn select_detail(&mut self, index: Option<usize>) -> Result<(), ViewError>;
    fn select_action(&mut self, index: Option<usize>) -> Result<(), ViewError>;
    fn row_label(&self, index: usize) -> Option<String>;
    fn row_detail(
        &self,
        index: usize,
        now: PrimitiveDateTime,
    ) -> Option<Vec<(&'static str, String)>>;
    fn row_target(&self, index: usize) -> Option<RowTarget>;
    fn replace(&mut self, snapshot: ScreenSnapshot) -> bool;
}

impl<R> PagedScreen for ScreenTable<R> {
    fn screen(&self) -> ScreenKind {
        self.screen
    }

    fn columns(&self) -> &'static [&'static str] {
        self.binding.columns
    }

    fn len(&self) -> usize {
        self.view.len()
    }

    fn filtered_len(&self) -> usize {
        self.view.filtered_len()
    }

    fn page_number(&self) -> usize {
        self.view.page_number()
    }

    fn page_count(&self) -> usize {
        self.view.page_count()
    }

    fn page_range(&self) -> Range<usize> {
        self.view.page_range()
    }

    fn filter_query(&self) -> &str {
        self.view.filter_query()
    }

    fn set_filter_query(&mut self, query: &str) {
        self.view.set_filter_query(query);
    }

    fn advance(&mut self) -> bool {
        self.view.advance()
    }

    fn retreat(&mut self) -> bool {
        self.view.retreat()
    }

    fn page_rows(&self, now: PrimitiveDateTime) -> Vec<Vec<String>> {
        self.view
            .current_page()
            .into_iter()
            .map(|record| (self.binding.row)(record, now))
            .collect()
    }

    fn selected_detail(&self) -> Option<usize> {
        self.view.selected_detail()
    }

    fn selected_action(&self) -> Option<usize> {
        self.view.selected_action()
    }

    fn select_detail(&mut self, index: Option<usize>) -> Result<(), ViewError> {
        self.view.select_detail(index)
    }

    fn select_action(&mut self, index: Option<usize>) -> Result<(), ViewError> {
        self.view.select_action(index)
    }

    fn row_label(&self, index: usize) -> Option<String> {
        self.view.get(index).map(self.binding.label)
    }

    fn row_detail(
        &self,
        index: usize,
        now: PrimitiveDateTime,
    ) -> Option<Vec<(&'static str, String)>> {
        self.view
            .get(index)
            .map(|record| (self.binding.detail)(record, now))
    }

    fn row_target(&self, index: usize) -> Option<RowTarget> {
        self.view.get(index).and_then(self.binding.target)
    }

    fn replace(&mut self, snapshot: ScreenSnapshot) -> bool {
        match (self.binding.extract)(snapshot) {
            Some(records) => {
                self.view.replace_collection(records);
                true
            }
            None => false,
        }
    }
}

fn screen_table(
    snapshot: ScreenSnapshot,
    page_size: usize,
) -> Result<Box<dyn PagedScreen>, ViewError> {
    let screen = snapshot.screen();
    let table: Box<dyn PagedScreen> = match snapshot {
        ScreenSnapshot::Trips(rows) => {
            Box::new(ScreenTable::new(screen, rows, page_size, trip_binding())?)
        }
        ScreenSnapshot::Issues(rows) => {
            Box::new(ScreenTable::new(screen, rows, page_size, issue_binding())?)
        }
        ScreenSnapshot::Invoices(rows) => {
            Box::new(ScreenTable::new(screen, rows, page_size, invoice_binding())?)
        }
        ScreenSnapshot::Vehicles(rows) => {
            Box::new(ScreenTable::new(screen, rows, page_size, vehicle_binding())?)
        }
        ScreenSnapshot::Jobs(rows) => {
            Box::new(ScreenTable::new(screen, rows, page_size, job_binding())?)
        }
        ScreenSnapshot::Billing { items, .. } => {
            Box::new(ScreenTable::new(screen, items, page_size, bill_binding())?)
        }
        ScreenSnapshot::Help(rows) => {
            Box::new(ScreenTable::new(screen, rows, page_size, help_binding())?)
        }
        ScreenSnapshot::Notifications(rows) => Box::new(ScreenTable::new(
            screen,
            rows,
            page_size,
            notification_binding(),
        )?),
    };
    Ok(table)
}

fn trip_binding() -> ScreenBinding<Trip> {
    ScreenBinding {
        columns: &[
            "code", "date", "route", "distance", "duration", "avg speed", "energy", "cost",
            "status",
        ],
        search: || {
            let code: SearchField<Trip> = |trip| trip.code.as_str();
            let from: SearchField<Trip> = |trip| trip.start_location.as_str();
            let to: SearchField<Trip> = |trip| trip.end_location.as_str();
            let status: SearchField<Trip> = |trip| trip.status.label();
            let notes: SearchField<Trip> = |trip| trip.notes.as_str();
            vec![code, from, to, status, notes]
        },
        row: |trip, _| {
            vec![
                trip.code.clone(),
                format_date(Some(trip.trip_date)),
                trip.route(),
                format!("{} km", trip.distance_km),
                format_duration_minutes(trip.duration_minutes),
                format!("{} km/h", trip.avg_speed_kmh),
                format!("{} kWh", trip.energy_kwh),
                format_paise(trip.cost_paise),
                trip.status.label().to_owned(),
            ]
        },
        detail: |trip, _| {
            vec![
                ("code", trip.code.clone()),
                ("date", format_long_date(trip.trip_date)),
                ("from", trip.start_location.clone()),
                ("to", trip.end_location.clone()),
                ("distance", format!("{} km", trip.distance_km)),
                ("duration", format_duration_minutes(trip.duration_minutes)),
                ("avg speed", format!("{} km/h", trip.avg_speed_kmh)),
                ("energy used", format!("{} kWh", trip.energy_kwh)),
                ("cost", format_paise(trip.cost_paise)),
                ("status", trip.status.label().to_owned()),
                ("notes", trip.notes.clone()),
            ]
        },
        label: |trip| trip.code.clone(),
        target: |trip| Some(RowTarget::Trip(trip.id)),
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Trips(rows) => Some(rows),
            _ => None,
        },
    }
}

fn issue_binding() -> ScreenBinding<VehicleIssue> {
    ScreenBinding {
        columns: &[
            "code", "vehicle", "error", "category", "reported", "severity", "status", "assignee",
        ],
        search: || {
            let code: SearchField<VehicleIssue> = |issue| issue.code.as_str();
            let vehicle: SearchField<VehicleIssue> = |issue| issue.vehicle_no.as_str();
            let error: SearchField<VehicleIssue> = |issue| issue.error_code.as_str();
            let category: SearchField<VehicleIssue> = |issue| issue.category.as_str();
            let description: SearchField<VehicleIssue> = |issue| issue.description.as_str();
            vec![code, vehicle, error, category, description]
        },
        row: |issue, _| {
            vec![
                issue.code.clone(),
                issue.vehicle_no.clone(),
                issue.error_code.clone(),
                issue.category.clone(),
                format_date(Some(issue.reported_on)),
                issue.severity.label().to_owned(),
                issue.status.label().to_owned(),
                assignee_label(&issue.assignee),
            ]
        },
        detail: |issue, _| {
            vec![
                ("code", issue.code.clone()),
                ("vehicle", issue.vehicle_no.clone()),
                ("error code", issue.error_code.clone()),
                ("category", issue.category.clone()),
                ("description", issue.description.clone()),
                ("reported", format_long_date(issue.reported_on)),
                (
                    "resolved",
                    issue.resolved_on.map(format_long_date).unwrap_or_default(),
                ),
                ("severity", issue.severity.label().to_owned()),
                ("status", issue.status.label().to_owned()),
                ("assignee", assignee_label(&issue.assignee)),
                ("cost", format_optional_paise(issue.cost_paise)),
                ("notes", issue.notes.clone()),
            ]
        },
        label: |issue| issue.code.clone(),
        target: |issue| Some(RowTarget::Issue(issue.id)),
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Issues(rows) => Some(rows),
            _ => None,
        },
    }
}

fn invoice_binding() -> ScreenBinding<Invoice> {
    ScreenBinding {
        columns: &[
            "invoice", "vehicle", "customer", "service", "issued", "amount", "status",
        ],
        search: || {
            let number: SearchField<Invoice> = |invoice| invoice.number.as_str();
            let vehicle: SearchField<Invoice> = |invoice| invoice.vehicle_no.as_str();
            let customer: SearchField<Invoice> = |invoice| invoice.customer.as_str();
            let service: SearchField<Invoice> = |invoice| invoice.service.as_str();
            vec![number, vehicle, customer, service]
        },
        row: |invoice, _| {
            vec![
                invoice.number.clone(),
                invoice.vehicle_no.clone(),
                invoice.customer.clone(),
                invoice.service.clone(),
                format_date(Some(invoice.issued_on)),
                format_paise(invoice.amount_paise),
                invoice.status.label().to_owned(),
            ]
        },
        detail: |invoice, _| {
            vec![
                ("invoice", invoice.number.clone()),
                ("vehicle", invoice.vehicle_no.clone()),
                ("customer", invoice.customer.clone()),
                ("service", invoice.service.clone()),
                ("issued", format_long_date(invoice.issued_on)),
                ("amount", format_paise(invoice.amount_paise)),
                ("status", invoice.status.label().to_owned()),
            ]
        },
        label: |invoice| invoice.number.clone(),
        target: |invoice| Some(RowTarget::Invoice(invoice.id)),
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Invoices(rows) => Some(rows),
            _ => None,
        },
    }
}

fn job_binding() -> ScreenBinding<Job> {
    ScreenBinding {
        columns: &[
            "code", "task", "assignee", "start", "deadline", "priority", "status", "sla",
        ],
        search: || {
            let code: SearchField<Job> = |job| job.code.as_str();
            let task: SearchField<Job> = |job| job.task.as_str();
            let assignee: SearchField<Job> = |job| job.assignee.as_str();
            vec![code, task, assignee]
        },
        row: |job, now| {
            vec![
                job.code.clone(),
                job.task.clone(),
                assignee_label(&job.assignee),
                format_time_of_day(job.starts_at),
                format_time_of_day(job.deadline),
                job.priority.label().to_owned(),
                job.status.label().to_owned(),
                sla_label(job, now),
            ]
        },
        detail: |job, now| {
            vec![
                ("code", job.code.clone()),
                ("task", job.task.clone()),
                ("assignee", assignee_label(&job.assignee)),
                ("start", format_datetime_minutes(job.starts_at)),
                ("deadline", format_datetime_minutes(job.deadline)),
                ("priority", job.priority.label().to_owned()),
                ("status", job.status.label().to_owned()),
                ("sla", sla_label(job, now)),
            ]
        },
        label: |job| format!("{} {}", job.code, job.task),
        target: |job| Some(RowTarget::Job(job.id)),
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Jobs(rows) => Some(rows),
            _ => None,
        },
    }
}

fn bill_binding() -> ScreenBinding<BillItem> {
    ScreenBinding {
        columns: &["item", "qty", "rate", "tax", "total"],
        search: || {
            let name: SearchField<BillItem> = |item| item.name.as_str();
            vec![name]
        },
        row: |item, _| {
            vec![
                item.name.clone(),
                item.quantity.to_string(),
                format_paise(item.rate_paise),
                format!("{}%", item.tax_percent),
                format_paise(item.line_total()),
            ]
        },
        detail: |item, _| {
            vec![
                ("item", item.name.clone()),
                ("quantity", item.quantity.to_string()),
                ("rate", format_paise(item.rate_paise)),
                ("tax", format!("{}%", item.tax_percent)),
                ("line total", format_paise(item.line_total())),
                ("line tax", format_paise(item.line_tax())),
            ]
        },
        label: |item| item.name.clone(),
        target: |item| Some(RowTarget::BillItem(item.id)),
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Billing { items, .. } => Some(items),
            _ => None,
        },
    }
}

fn vehicle_binding() -> ScreenBinding<Vehicle> {
    ScreenBinding {
        columns: &[
            "code", "registration", "model", "owner", "charge", "health", "temp", "range",
            "battery",
        ],
        search: || {
            let code: SearchField<Vehicle> = |vehicle| vehicle.code.as_str();
            let registration: SearchField<Vehicle> = |vehicle| vehicle.registration_no.as_str();
            let model: SearchField<Vehicle> = |vehicle| vehicle.model.as_str();
            let owner: SearchField<Vehicle> = |vehicle| vehicle.owner.as_str();
            vec![code, registration, model, owner]
        },
        row: |vehicle, _| {
            let mut row = vec![
                vehicle.code.clone(),
                vehicle.registration_no.clone(),
                vehicle.model.clone(),
                vehicle.owner.clone(),
            ];
            match &vehicle.battery {
                Some(reading) => row.extend([
                    format!("{}%", reading.charge_percent),
                    format!("{}%", reading.health_percent),
                    format!("{}°C", reading.temperature_c),
                    format!("{} km", reading.range_km),
                    reading.condition().label().to_owned(),
                ]),
                None => row.extend([
                    "-".to_owned(),
                    "-".to_owned(),
                    "-".to_owned(),
                    "-".to_owned(),
                    "no readings".to_owned(),
                ]),
            }
            row
        },
        detail: |vehicle, _| {
            let mut lines = vec![
                ("code", vehicle.code.clone()),
                ("registration", vehicle.registration_no.clone()),
                ("model", vehicle.model.clone()),
                ("colour", vehicle.colour.clone()),
                ("owner", vehicle.owner.clone()),
            ];
            let Some(reading) = &vehicle.battery else {
                lines.push(("battery", "no readings".to_owned()));
                return lines;
            };
            lines.extend([
                ("battery", reading.condition().label().to_owned()),
                ("charge", format!("{}%", reading.charge_percent)),
                ("health", format!("{}%", reading.health_percent)),
                ("temperature", format!("{}°C", reading.temperature_c)),
                ("capacity", format!("{} kWh", reading.capacity_kwh)),
                ("range", format!("{} km", reading.range_km)),
                ("recorded", format_datetime_minutes(reading.recorded_at)),
            ]);
            lines
        },
        label: |vehicle| format!("{} {}", vehicle.code, vehicle.registration_no),
        target: |_| None,
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Vehicles(rows) => Some(rows),
            _ => None,
        },
    }
}

fn help_binding() -> ScreenBinding<HelpArticle> {
    ScreenBinding {
        columns: &["topic"],
        search: || {
            let title: SearchField<HelpArticle> = |article| article.title.as_str();
            vec![title]
        },
        row: |article, _| vec![article.title.clone()],
        detail: |article, _| vec![("topic", article.title.clone()), ("", article.body.clone())],
        label: |article| article.title.clone(),
        target: |_| None,
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Help(rows) => Some(rows),
            _ => None,
        },
    }
}

fn notification_binding() -> ScreenBinding<Notification> {
    ScreenBinding {
        columns: &["severity", "message", "received"],
        search: || {
            let message: SearchField<Notification> = |notification| notification.message.as_str();
            vec![message]
        },
        row: |notification, _| {
            vec![
                notification.severity.label().to_owned(),
                notification.message.clone(),
                format_date(Some(notification.created_at.date())),
            ]
        },
        detail: |notification, _| {
            vec![
                ("severity", notification.severity.label().to_owned()),
                ("message", notification.message.clone()),
                (
                    "received",
                    format_long_date(notification.created_at.date()),
                ),
            ]
        },
        label: |notification| truncate_label(&notification.message, LABEL_MAX_CHARS),
        target: |notification| Some(RowTarget::Notification(notification.id)),
        extract: |snapshot| match snapshot {
            ScreenSnapshot::Notifications(rows) => Some(rows),
            _ => None,
        },
    }
}

fn assignee_label(assignee: &str) -> String {
    if assignee.trim().is_empty() {
        "unassigned".to_owned()
    } else {
        assignee.to_owned()
    }
}

fn sla_label(job: &Job, now: PrimitiveDateTime) -> String {
    if job.status == JobStatus::Completed {
        return "done".to_owned();
    }
    let remaining = job.sla_remaining(now);
    let minutes = remaining.whole_minutes();
    let sla = job.sla(now).label();
    if remaining.is_positive() {
        format!("{sla} ({} left)", format_duration_minutes(minutes))
    } else {
        format!("{sla} ({} over)", format_duration_minutes(minutes.saturating_neg()))
    }
}

fn truncate_label(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_owned();
    }
    let mut out = value
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternalEvent {
    ClearStatus { token: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlay {
    Profile,
    Products { cursor: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FormUiState {
    kind: FormKind,
    field_index: usize,
    values: Vec<String>,
}

struct ViewData {
    page_size: usize,
    now: PrimitiveDateTime,
    summary: FleetSummary,
    table: Option<Box<dyn PagedScreen>>,
    products: Vec<Product>,
    bill: BillSummary,
    profile: Option<UserProfile>,
    cursor: usize,
    overlay: Option<Overlay>,
    form: Option<FormUiState>,
    help_visible: bool,
    status_token: u64,
}

impl ViewData {
    fn new(page_size: usize, now: PrimitiveDateTime) -> Self {
        Self {
            page_size,
            now,
            summary: FleetSummary::default(),
            table: None,
            products: Vec::new(),
            bill: BillSummary::default(),
            profile: None,
            cursor: 0,
            overlay: None,
            form: None,
            help_visible: false,
            status_token: 0,
        }
    }

    /// Filtered index of the row under the cursor.
    fn cursor_index(&self) -> Option<usize> {
        let range = self.table.as_ref()?.page_range();
        let index = range.start + self.cursor;
        (index < range.end).then_some(index)
    }

    fn clamp_cursor(&mut self) {
        let len = self
            .table
            .as_ref()
            .map_or(0, |table| table.page_range().len());
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }
}

pub fn run_app<R: AppRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(runtime.page_size(), runtime.now());
    let (internal_tx, internal_rx) = mpsc::channel();

    if let Err(error) = refresh_view_data(state, runtime, &mut view_data) {
        state.dispatch(AppCommand::SetStatus(format!("load failed: {error:#}")));
    }

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_rx);
        view_data.now = runtime.now();

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        let has_event = match event::poll(POLL_INTERVAL).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn handle_key_event<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.help_visible {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?')) {
            view_data.help_visible = false;
            emit_status(state, view_data, internal_tx, "help hidden");
        }
        return false;
    }

    match state.mode {
        AppMode::Form(_) => {
            handle_form_key(state, runtime, view_data, internal_tx, key);
            return false;
        }
        AppMode::Filter => {
            handle_filter_key(state, runtime, view_data, internal_tx, key);
            return false;
        }
        AppMode::Nav => {}
    }

    match view_data.overlay {
        Some(Overlay::Products { cursor }) => {
            handle_product_picker_key(state, runtime, view_data, internal_tx, key, cursor);
            return false;
        }
        Some(Overlay::Profile) => {
            handle_profile_key(state, view_data, internal_tx, key);
            return false;
        }
        None => {}
    }

    let (detail_open, action_open) = view_data.table.as_ref().map_or((false, false), |table| {
        (
            table.selected_detail().is_some(),
            table.selected_action().is_some(),
        )
    });
    if action_open {
        handle_action_overlay_key(state, runtime, view_data, internal_tx, key);
        return false;
    }
    if detail_open {
        match key.code {
            KeyCode::Enter | KeyCode::Esc => toggle_detail(state, view_data, internal_tx),
            KeyCode::Char('e') => {
                toggle_detail(state, view_data, internal_tx);
                toggle_action(state, view_data, internal_tx);
            }
            _ => {}
        }
        return false;
    }

    handle_nav_key(state, runtime, view_data, internal_tx, key)
}

fn handle_nav_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) || key.modifiers.contains(KeyModifiers::ALT)
    {
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => {
            turn_page(state, view_data, internal_tx, true);
        }
        KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => {
            turn_page(state, view_data, internal_tx, false);
        }
        KeyCode::Char('j') | KeyCode::Down => move_cursor(view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_cursor(view_data, -1),
        KeyCode::Enter => toggle_detail(state, view_data, internal_tx),
        KeyCode::Char('e') => toggle_action(state, view_data, internal_tx),
        KeyCode::Char('/') => {
            if view_data.table.is_some() {
                state.dispatch(AppCommand::EnterFilter);
            }
        }
        KeyCode::Char('a') => match state.active_screen.add_form() {
            Some(kind) => open_form(state, view_data, kind),
            None => {
                let message = format!("nothing to add on {}", state.active_screen.label());
                emit_status(state, view_data, internal_tx, message);
            }
        },
        KeyCode::Char('o') if state.active_screen == ScreenKind::Billing => {
            if view_data.products.is_empty() {
                emit_status(state, view_data, internal_tx, "no products in the catalogue");
            } else {
                view_data.overlay = Some(Overlay::Products { cursor: 0 });
            }
        }
        KeyCode::Char('g') if state.active_screen == ScreenKind::Billing => {
            if view_data.bill.items == 0 {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "bill is empty -- add items with a or o before generating an invoice",
                );
            } else {
                open_form(state, view_data, FormKind::Invoice);
            }
        }
        KeyCode::Tab | KeyCode::Char('f') => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::NextScreen, internal_tx);
        }
        KeyCode::BackTab | KeyCode::Char('b') => {
            dispatch_and_refresh(state, runtime, view_data, AppCommand::PrevScreen, internal_tx);
        }
        KeyCode::Char('P') => match runtime.load_profile() {
            Ok(profile) => {
                view_data.profile = profile;
                view_data.overlay = Some(Overlay::Profile);
            }
            Err(error) => emit_status(
                state,
                view_data,
                internal_tx,
                format!("load profile failed: {error:#}"),
            ),
        },
        KeyCode::Char('r') => match refresh_view_data(state, runtime, view_data) {
            Ok(()) => emit_status(state, view_data, internal_tx, "reloaded"),
            Err(error) => emit_status(
                state,
                view_data,
                internal_tx,
                format!("load failed: {error:#}"),
            ),
        },
        KeyCode::Char('R') => {
            let message = match runtime.sync_remote() {
                Ok(message) => match refresh_view_data(state, runtime, view_data) {
                    Ok(()) => message,
                    Err(error) => format!("{message}; reload failed: {error:#}"),
                },
                Err(error) => format!("sync failed: {error:#}"),
            };
            emit_status(state, view_data, internal_tx, message);
        }
        KeyCode::Char('?') => view_data.help_visible = true,
        _ => {}
    }
    false
}

fn turn_page(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    forward: bool,
) {
    let Some(table) = view_data.table.as_mut() else {
        return;
    };
    let moved = if forward {
        table.advance()
    } else {
        table.retreat()
    };
    let message = match (moved, forward) {
        (true, _) => format!("page {} of {}", table.page_number(), table.page_count()),
        (false, true) => "already on the last page".to_owned(),
        (false, false) => "already on the first page".to_owned(),
    };
    view_data.clamp_cursor();
    emit_status(state, view_data, internal_tx, message);
}

fn move_cursor(view_data: &mut ViewData, delta: isize) {
    let len = view_data
        .table
        .as_ref()
        .map_or(0, |table| table.page_range().len());
    if len == 0 {
        view_data.cursor = 0;
        return;
    }
    let next = (view_data.cursor as isize + delta).clamp(0, len as isize - 1);
    view_data.cursor = next as usize;
}

fn toggle_detail(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let index = view_data.cursor_index();
    let Some(table) = view_data.table.as_mut() else {
        return;
    };
    let next = match table.selected_detail() {
        Some(_) => None,
        None => index,
    };
    if next.is_none() && table.selected_detail().is_none() {
        emit_status(state, view_data, internal_tx, "no row selected");
        return;
    }
    if let Err(error) = table.select_detail(next) {
        emit_status(state, view_data, internal_tx, error.to_string());
    }
}

fn toggle_action(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if RowAction::options_for(state.active_screen).is_empty() {
        let message = format!("no actions on {}", state.active_screen.label());
        emit_status(state, view_data, internal_tx, message);
        return;
    }
    let index = view_data.cursor_index();
    let Some(table) = view_data.table.as_mut() else {
        return;
    };
    let next = match table.selected_action() {
        Some(_) => None,
        None => index,
    };
    if next.is_none() && table.selected_action().is_none() {
        emit_status(state, view_data, internal_tx, "no row selected");
        return;
    }
    if let Err(error) = table.select_action(next) {
        emit_status(state, view_data, internal_tx, error.to_string());
    }
}

fn handle_action_overlay_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('e') => toggle_action(state, view_data, internal_tx),
        KeyCode::Char(digit @ '1'..='9') => {
            let choice = digit as usize - '1' as usize;
            apply_action_choice(state, runtime, view_data, internal_tx, choice);
        }
        _ => {}
    }
}

fn apply_action_choice<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    choice: usize,
) {
    let options = RowAction::options_for(state.active_screen);
    let Some(action) = options.get(choice).copied() else {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("no action {} -- choose 1-{}", choice + 1, options.len()),
        );
        return;
    };
    let Some((target, label)) = view_data.table.as_ref().and_then(|table| {
        let index = table.selected_action()?;
        Some((table.row_target(index)?, table.row_label(index)?))
    }) else {
        emit_status(state, view_data, internal_tx, "no row selected");
        return;
    };

    let message = match runtime.apply_row_action(target, action) {
        Ok(()) => match refresh_view_data(state, runtime, view_data) {
            Ok(()) => format!("{}: {label}", action.label()),
            Err(error) => format!("load failed: {error:#}"),
        },
        Err(error) => format!("{error:#}"),
    };
    emit_status(state, view_data, internal_tx, message);
}

fn handle_filter_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    if view_data.table.is_none() {
        dispatch_and_refresh(state, runtime, view_data, AppCommand::ExitToNav, internal_tx);
        return;
    }
    let Some(table) = view_data.table.as_mut() else {
        return;
    };
    match key.code {
        KeyCode::Enter => {
            let message = if table.filter_query().trim().is_empty() {
                "filter off".to_owned()
            } else {
                format!(
                    "filter \"{}\": {} of {}",
                    table.filter_query(),
                    table.filtered_len(),
                    table.len()
                )
            };
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, message);
        }
        KeyCode::Esc => {
            table.set_filter_query("");
            view_data.cursor = 0;
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, "filter cleared");
        }
        KeyCode::Backspace => {
            let mut query = table.filter_query().to_owned();
            query.pop();
            table.set_filter_query(&query);
            view_data.cursor = 0;
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let mut query = table.filter_query().to_owned();
            query.push(ch);
            table.set_filter_query(&query);
            view_data.cursor = 0;
        }
        _ => {}
    }
}

fn handle_product_picker_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
    cursor: usize,
) {
    let last = view_data.products.len().saturating_sub(1);
    let chosen = match key.code {
        KeyCode::Esc | KeyCode::Char('o') => {
            view_data.overlay = None;
            return;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            view_data.overlay = Some(Overlay::Products {
                cursor: (cursor + 1).min(last),
            });
            return;
        }
        KeyCode::Char('k') | KeyCode::Up => {
            view_data.overlay = Some(Overlay::Products {
                cursor: cursor.saturating_sub(1),
            });
            return;
        }
        KeyCode::Enter => cursor,
        KeyCode::Char(digit @ '1'..='9') => digit as usize - '1' as usize,
        _ => return,
    };

    let Some(product) = view_data.products.get(chosen).cloned() else {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("no product {}", chosen + 1),
        );
        return;
    };
    view_data.overlay = None;
    let message = match runtime.add_product_to_bill(product.id) {
        Ok(()) => match refresh_view_data(state, runtime, view_data) {
            Ok(()) => format!("added {} to the bill", product.name),
            Err(error) => format!("load failed: {error:#}"),
        },
        Err(error) => format!("{error:#}"),
    };
    emit_status(state, view_data, internal_tx, message);
}

fn handle_profile_key(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('P') => view_data.overlay = None,
        KeyCode::Char('e') => {
            if view_data.profile.is_none() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "no profile yet -- sign in with --login or load --demo data first",
                );
                return;
            }
            view_data.overlay = None;
            open_form(state, view_data, FormKind::Profile);
        }
        _ => {}
    }
}

fn open_form(state: &mut AppState, view_data: &mut ViewData, kind: FormKind) {
    view_data.overlay = None;
    let values = form_template(
        kind,
        view_data.now,
        view_data.profile.as_ref(),
        state.user.as_ref(),
    );
    state.dispatch(AppCommand::OpenForm(kind));
    view_data.form = Some(FormUiState {
        kind,
        field_index: 0,
        values,
    });
}

/// Starting text for each field of a new form.
fn form_template(
    kind: FormKind,
    now: PrimitiveDateTime,
    profile: Option<&UserProfile>,
    user: Option<&SessionUser>,
) -> Vec<String> {
    let mut values = vec![String::new(); fields_for(kind).len()];
    let today = format_date(Some(now.date()));
    match kind {
        FormKind::Trip => {
            values[1] = today;
            values[8] = "ongoing".to_owned();
        }
        FormKind::Issue => {
            values[4] = today;
            values[5] = "medium".to_owned();
            values[6] = "open".to_owned();
        }
        FormKind::Job => {
            values[2] = format_datetime_minutes(now);
            values[3] = format_datetime_minutes(now + time::Duration::hours(2));
            values[4] = "normal".to_owned();
            values[5] = "assigned".to_owned();
        }
        FormKind::BillItem => {
            values[1] = "1".to_owned();
            values[3] = "0".to_owned();
        }
        FormKind::SupportTicket => {
            if let Some(profile) = profile {
                values[0].clone_from(&profile.name);
                values[1].clone_from(&profile.email);
            } else if let Some(user) = user {
                values[0].clone_from(&user.name);
                values[1].clone_from(&user.email);
            }
        }
        FormKind::Profile => {
            if let Some(profile) = profile {
                values = ProfileForm::from_profile(profile).to_fields();
            }
        }
        FormKind::Vehicle => {
            if let Some(user) = user {
                values[4].clone_from(&user.name);
            }
        }
        FormKind::Invoice => {}
    }
    values
}

fn handle_form_key<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let Some(form) = view_data.form.as_mut() else {
        state.dispatch(AppCommand::ExitToNav);
        return;
    };
    let field_count = form.values.len();

    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => {
            let kind = form.kind;
            view_data.form = None;
            state.dispatch(AppCommand::ExitToNav);
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("{} form canceled", kind.label()),
            );
        }
        (KeyCode::Enter, _) | (KeyCode::Char('s'), KeyModifiers::CONTROL) => {
            submit_form(state, runtime, view_data, internal_tx);
        }
        (KeyCode::Tab | KeyCode::Down, _) if field_count > 0 => {
            form.field_index = (form.field_index + 1) % field_count;
        }
        (KeyCode::BackTab | KeyCode::Up, _) if field_count > 0 => {
            form.field_index = (form.field_index + field_count - 1) % field_count;
        }
        (KeyCode::Backspace, _) => {
            if let Some(value) = form.values.get_mut(form.field_index) {
                value.pop();
            }
        }
        (KeyCode::Char(ch), modifiers)
            if !modifiers.contains(KeyModifiers::CONTROL)
                && !modifiers.contains(KeyModifiers::ALT) =>
        {
            if let Some(value) = form.values.get_mut(form.field_index) {
                value.push(ch);
            }
        }
        _ => {}
    }
}

fn submit_form<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(form) = view_data.form.as_ref() else {
        return;
    };
    let kind = form.kind;
    let submitted = FormPayload::from_fields(kind, &form.values).and_then(|payload| {
        payload.validate()?;
        runtime.submit_form(&payload)
    });
    if let Err(error) = submitted {
        emit_status(state, view_data, internal_tx, format!("{error:#}"));
        return;
    }

    view_data.form = None;
    if kind == FormKind::Profile {
        match runtime.load_profile() {
            Ok(profile) => view_data.profile = profile,
            Err(error) => {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    format!("load profile failed: {error:#}"),
                );
            }
        }
    }
    dispatch_and_refresh(
        state,
        runtime,
        view_data,
        AppCommand::FormSubmitted(kind),
        internal_tx,
    );
}

fn dispatch_and_refresh<R: AppRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    command: AppCommand,
    internal_tx: &Sender<InternalEvent>,
) {
    let events = state.dispatch(command);
    if should_refresh_view(&events)
        && let Err(error) = refresh_view_data(state, runtime, view_data)
    {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("load failed: {error:#}"),
        );
        return;
    }
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
    {
        view_data.status_token = view_data.status_token.saturating_add(1);
        schedule_status_clear(internal_tx, view_data.status_token);
    }
}

fn should_refresh_view(events: &[AppEvent]) -> bool {
    events.iter().any(|event| {
        matches!(
            event,
            AppEvent::ScreenChanged(_) | AppEvent::RoleChanged(_) | AppEvent::FormSubmitted(_)
        )
    })
}

fn refresh_view_data<R: AppRuntime>(
    state: &AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
) -> Result<()> {
    view_data.now = runtime.now();
    view_data.summary = runtime.load_summary()?;

    let snapshot = runtime.load_screen(state.active_screen)?;
    if snapshot.screen() != state.active_screen {
        bail!(
            "record source returned {} rows for the {} screen -- reload and retry",
            snapshot.screen().label(),
            state.active_screen.label()
        );
    }
    if let ScreenSnapshot::Billing { items, products } = &snapshot {
        view_data.bill = BillSummary::from_items(items);
        view_data.products.clone_from(products);
    }

    let same_screen = view_data
        .table
        .as_ref()
        .is_some_and(|table| table.screen() == state.active_screen);
    if same_screen && let Some(table) = view_data.table.as_mut() {
        table.replace(snapshot);
    } else {
        view_data.table = Some(screen_table(snapshot, view_data.page_size)?);
        view_data.cursor = 0;
        view_data.overlay = None;
    }
    view_data.clamp_cursor();
    Ok(())
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let screens = state.screens();
    let selected = screens
        .iter()
        .position(|screen| *screen == state.active_screen)
        .unwrap_or(0);
    let titles = screens
        .iter()
        .map(|screen| screen.label())
        .collect::<Vec<_>>();
    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .title(header_title(state))
                .borders(Borders::ALL),
        )
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    let summary = Paragraph::new(summary_text(&view_data.summary))
        .style(Style::default().fg(Color::Gray));
    frame.render_widget(summary, layout[1]);

    render_table(frame, layout[2], state, view_data);

    let status_widget = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_widget, layout[3]);

    if let Some(table) = view_data.table.as_deref() {
        if let Some(index) = table.selected_detail() {
            let area = centered_rect(64, 60, frame.area());
            frame.render_widget(Clear, area);
            let detail = Paragraph::new(render_detail_overlay_text(table, index, view_data.now))
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .title(table.row_label(index).unwrap_or_default())
                        .borders(Borders::ALL),
                );
            frame.render_widget(detail, area);
        }
        if let Some(index) = table.selected_action() {
            let area = centered_rect(48, 40, frame.area());
            frame.render_widget(Clear, area);
            let actions = Paragraph::new(render_action_overlay_text(
                state.active_screen,
                &table.row_label(index).unwrap_or_default(),
            ))
            .block(Block::default().title("actions").borders(Borders::ALL));
            frame.render_widget(actions, area);
        }
    }

    match view_data.overlay {
        Some(Overlay::Products { cursor }) => {
            let area = centered_rect(48, 40, frame.area());
            frame.render_widget(Clear, area);
            let picker = Paragraph::new(render_products_overlay_text(&view_data.products, cursor))
                .block(Block::default().title("products").borders(Borders::ALL));
            frame.render_widget(picker, area);
        }
        Some(Overlay::Profile) => {
            let area = centered_rect(60, 60, frame.area());
            frame.render_widget(Clear, area);
            let profile = Paragraph::new(render_profile_overlay_text(view_data.profile.as_ref()))
                .wrap(Wrap { trim: false })
                .block(Block::default().title("profile").borders(Borders::ALL));
            frame.render_widget(profile, area);
        }
        None => {}
    }

    if let Some(form) = &view_data.form {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let editor = Paragraph::new(render_form_overlay_text(form)).block(
            Block::default()
                .title(format!("new {}", form.kind.label()))
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Cyan)),
        );
        frame.render_widget(editor, area);
    }

    if view_data.help_visible {
        let area = centered_rect(80, 72, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn header_title(state: &AppState) -> String {
    match &state.user {
        Some(user) => format!("fleetview | {} ({})", user.name, state.role.label()),
        None => format!("fleetview | {}", state.role.label()),
    }
}

fn summary_text(summary: &FleetSummary) -> String {
    format!(
        " open issues {} | pending invoices {} ({}) | jobs at risk {} | breached {} | batteries needing attention {}",
        summary.open_issues,
        summary.pending_invoices,
        format_paise(summary.pending_amount_paise),
        summary.jobs_at_risk,
        summary.jobs_breached,
        summary.vehicles_needing_attention
    )
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let Some(table) = view_data.table.as_deref() else {
        let empty = Paragraph::new(String::new()).block(
            Block::default()
                .borders(Borders::ALL)
                .title(state.active_screen.label()),
        );
        frame.render_widget(empty, area);
        return;
    };

    let title = table_title(table, &view_data.bill);
    if table.filtered_len() == 0 {
        let message = if table.filter_query().trim().is_empty() {
            "nothing here yet".to_owned()
        } else {
            format!("no rows match \"{}\"", table.filter_query())
        };
        let empty =
            Paragraph::new(message).block(Block::default().borders(Borders::ALL).title(title));
        frame.render_widget(empty, area);
        return;
    }

    let columns = table.columns();
    let widths = vec![Constraint::Min(8); columns.len().max(1)];
    let header = Row::new(columns.iter().map(|label| {
        Cell::from(*label).style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let rows = table
        .page_rows(view_data.now)
        .into_iter()
        .enumerate()
        .map(|(row_index, cells)| {
            let style = if row_index == view_data.cursor {
                Style::default().bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Row::new(cells.into_iter().map(Cell::from)).style(style)
        });

    let widget = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().title(title).borders(Borders::ALL));
    frame.render_widget(widget, area);
}

fn table_title(table: &dyn PagedScreen, bill: &BillSummary) -> String {
    let mut title = format!(
        "{} | page {}/{} | {} of {}",
        table.screen().label(),
        table.page_number(),
        table.page_count(),
        table.filtered_len(),
        table.len()
    );
    if !table.filter_query().is_empty() {
        title.push_str(&format!(" | filter \"{}\"", table.filter_query()));
    }
    if table.screen() == ScreenKind::Billing {
        title.push_str(&format!(
            " | subtotal {} tax {} total {}",
            format_paise(bill.subtotal_paise),
            format_paise(bill.tax_paise),
            format_paise(bill.total_paise)
        ));
    }
    title
}

fn render_detail_overlay_text(
    table: &dyn PagedScreen,
    index: usize,
    now: PrimitiveDateTime,
) -> String {
    let Some(fields) = table.row_detail(index, now) else {
        return "row no longer exists".to_owned();
    };
    let width = fields
        .iter()
        .map(|(label, _)| label.len())
        .max()
        .unwrap_or(0);
    let mut lines = fields
        .into_iter()
        .map(|(label, value)| {
            if label.is_empty() {
                format!("\n{value}")
            } else {
                format!("{label:<width$}  {value}")
            }
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("enter/esc close | e actions".to_owned());
    lines.join("\n")
}

fn render_action_overlay_text(screen: ScreenKind, label: &str) -> String {
    let mut lines = vec![label.to_owned(), String::new()];
    lines.extend(
        RowAction::options_for(screen)
            .into_iter()
            .enumerate()
            .map(|(index, action)| format!("{} {}", index + 1, action.label())),
    );
    lines.push(String::new());
    lines.push("1-9 choose | e/esc close".to_owned());
    lines.join("\n")
}

fn render_products_overlay_text(products: &[Product], cursor: usize) -> String {
    let mut lines = products
        .iter()
        .enumerate()
        .map(|(index, product)| {
            let marker = if index == cursor { ">" } else { " " };
            format!(
                "{marker} {} {:<16} {}",
                index + 1,
                product.name,
                format_paise(product.price_paise)
            )
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("j/k move | enter or 1-9 add | esc close".to_owned());
    lines.join("\n")
}

fn render_profile_overlay_text(profile: Option<&UserProfile>) -> String {
    let Some(profile) = profile else {
        return "no profile yet -- sign in with --login or load --demo data first\n\nesc close"
            .to_owned();
    };
    let last_login = profile
        .last_login
        .map_or_else(|| "never".to_owned(), format_long_date);
    let status = if profile.active { "active" } else { "inactive" };
    [
        format!("name        {}", profile.name),
        format!("role        {}", profile.role.label()),
        format!("email       {}", profile.email),
        format!("phone       {}", profile.phone),
        format!("username    {}", profile.username),
        format!("member since {}", format_long_date(profile.created_on)),
        format!("last login  {last_login}"),
        format!("status      {status}"),
        String::new(),
        profile.bio.clone(),
        String::new(),
        "e edit | esc close".to_owned(),
    ]
    .join("\n")
}

fn render_form_overlay_text(form: &FormUiState) -> String {
    let fields = fields_for(form.kind);
    let width = fields
        .iter()
        .map(|field| field.label.len())
        .max()
        .unwrap_or(0);
    let mut lines = fields
        .iter()
        .zip(&form.values)
        .enumerate()
        .map(|(index, (field, value))| {
            let marker = if index == form.field_index { ">" } else { " " };
            let cursor = if index == form.field_index { "_" } else { "" };
            format!("{marker} {:<width$}  {value}{cursor}", field.label)
        })
        .collect::<Vec<_>>();
    lines.push(String::new());
    lines.push("tab/shift+tab field | enter save | esc cancel".to_owned());
    lines.join("\n")
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    if view_data.help_visible {
        return String::new();
    }

    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Filter => "FILTER",
        AppMode::Form(_) => "FORM",
    };
    let hints = match state.mode {
        AppMode::Nav if state.active_screen == ScreenKind::Billing => {
            "n/p page | j/k row | enter detail | e action | / filter | a add | o products | g invoice | f/b screen | P profile | r/R reload/sync | ? help | q quit".to_owned()
        }
        AppMode::Nav => {
            "n/p page | j/k row | enter detail | e action | / filter | a add | f/b screen | P profile | r/R reload/sync | ? help | q quit".to_owned()
        }
        AppMode::Filter => {
            let query = view_data
                .table
                .as_ref()
                .map(|table| table.filter_query())
                .unwrap_or_default();
            format!("/{query}_ | enter keep | esc clear")
        }
        AppMode::Form(kind) => match &view_data.form {
            Some(form) => form_field_status(kind, form.field_index),
            None => kind.label().to_owned(),
        },
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn form_field_status(kind: FormKind, index: usize) -> String {
    let fields = fields_for(kind);
    let Some(field) = fields.get(index) else {
        return kind.label().to_owned();
    };
    let mut status = format!(
        "{} {}/{}: {}",
        kind.label(),
        index + 1,
        fields.len(),
        field.label
    );
    if !field.hint.is_empty() {
        status.push_str(&format!(" ({})", field.hint));
    }
    status
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help\n\
nav: n/right/pgdn next page | p/left/pgup previous page | j/k row\n\
nav: enter detail | e actions (1-9 choose) | / filter | a add | r reload | R sync\n\
nav: tab/shift+tab or f/b switch screen | P profile (e edit) | q quit\n\
billing: o product picker | g generate invoice from the bill\n\
filter: type to narrow rows | backspace delete | enter keep | esc clear\n\
form: tab/shift+tab field | enter or ctrl+s save | esc cancel"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
