// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime};

use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Personal,
    Service,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Admin, Self::Personal, Self::Service];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Personal => "PERSONAL",
            Self::Service => "SERVICE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "PERSONAL" => Some(Self::Personal),
            "SERVICE" => Some(Self::Service),
            _ => None,
        }
    }

    /// Role used for routing a backend role string; unknown roles get the
    /// personal dashboard.
    pub fn route(value: &str) -> Self {
        Self::parse(value).unwrap_or(Self::Personal)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Personal => "personal",
            Self::Service => "service",
        }
    }

    pub const fn landing_screen(self) -> ScreenKind {
        match self {
            Self::Admin | Self::Personal => ScreenKind::Trips,
            Self::Service => ScreenKind::Jobs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenKind {
    Trips,
    Issues,
    Invoices,
    Vehicles,
    Jobs,
    Billing,
    Help,
    Notifications,
}

impl ScreenKind {
    pub const ALL: [Self; 8] = [
        Self::Trips,
        Self::Issues,
        Self::Invoices,
        Self::Vehicles,
        Self::Jobs,
        Self::Billing,
        Self::Help,
        Self::Notifications,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Trips => "trips",
            Self::Issues => "issues",
            Self::Invoices => "invoices",
            Self::Vehicles => "vehicles",
            Self::Jobs => "jobs",
            Self::Billing => "billing",
            Self::Help => "help",
            Self::Notifications => "alerts",
        }
    }

    pub fn for_role(role: Role) -> &'static [Self] {
        const PERSONAL: [ScreenKind; 6] = [
            ScreenKind::Trips,
            ScreenKind::Invoices,
            ScreenKind::Issues,
            ScreenKind::Vehicles,
            ScreenKind::Help,
            ScreenKind::Notifications,
        ];
        const SERVICE: [ScreenKind; 5] = [
            ScreenKind::Jobs,
            ScreenKind::Issues,
            ScreenKind::Billing,
            ScreenKind::Help,
            ScreenKind::Notifications,
        ];
        match role {
            Role::Admin => &Self::ALL,
            Role::Personal => &PERSONAL,
            Role::Service => &SERVICE,
        }
    }

    pub fn visible_to(self, role: Role) -> bool {
        Self::for_role(role).contains(&self)
    }

    /// Form opened by the add key on this screen, if any.
    pub const fn add_form(self) -> Option<FormKind> {
        match self {
            Self::Trips => Some(FormKind::Trip),
            Self::Issues => Some(FormKind::Issue),
            Self::Vehicles => Some(FormKind::Vehicle),
            Self::Jobs => Some(FormKind::Job),
            Self::Billing => Some(FormKind::BillItem),
            Self::Help => Some(FormKind::SupportTicket),
            Self::Invoices | Self::Notifications => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripStatus {
    Completed,
    Ongoing,
    Cancelled,
}

impl TripStatus {
    pub const ALL: [Self; 3] = [Self::Completed, Self::Ongoing, Self::Cancelled];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Ongoing => "ongoing",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "completed" => Some(Self::Completed),
            "ongoing" => Some(Self::Ongoing),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Ongoing => "Ongoing",
            Self::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueStatus {
    Open,
    InProgress,
    Resolved,
}

impl IssueStatus {
    pub const ALL: [Self; 3] = [Self::Open, Self::InProgress, Self::Resolved];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "in_progress" | "in progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Paid,
    Pending,
}

impl InvoiceStatus {
    pub const ALL: [Self; 2] = [Self::Paid, Self::Pending];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Pending => "pending",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paid" => Some(Self::Paid),
            "pending" => Some(Self::Pending),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::Pending => "Pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobPriority {
    Critical,
    High,
    Normal,
}

impl JobPriority {
    pub const ALL: [Self; 3] = [Self::Critical, Self::High, Self::Normal];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Normal => "normal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Normal => "Normal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Assigned,
    InProgress,
    Completed,
}

impl JobStatus {
    pub const ALL: [Self; 3] = [Self::Assigned, Self::InProgress, Self::Completed];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "assigned" => Some(Self::Assigned),
            "in_progress" | "in progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Assigned => "Assigned",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
        }
    }
}

const SLA_RISK_WINDOW: Duration = Duration::minutes(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlaStatus {
    OnTrack,
    AtRisk,
    Breached,
}

impl SlaStatus {
    /// Breached once the deadline is no longer in the future; at risk within
    /// the final hour.
    pub fn evaluate(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> Self {
        let remaining = deadline - now;
        if remaining <= Duration::ZERO {
            Self::Breached
        } else if remaining <= SLA_RISK_WINDOW {
            Self::AtRisk
        } else {
            Self::OnTrack
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::OnTrack => "On Track",
            Self::AtRisk => "At Risk",
            Self::Breached => "Breached",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Trip,
    Issue,
    Vehicle,
    Job,
    BillItem,
    Invoice,
    SupportTicket,
    Profile,
}

impl FormKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Trip => "trip",
            Self::Issue => "issue",
            Self::Vehicle => "vehicle",
            Self::Job => "job",
            Self::BillItem => "bill item",
            Self::Invoice => "invoice",
            Self::SupportTicket => "support ticket",
            Self::Profile => "profile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Filter,
    Form(FormKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowAction {
    SetTripStatus(TripStatus),
    SetIssueStatus(IssueStatus),
    SetInvoiceStatus(InvoiceStatus),
    SetJobStatus(JobStatus),
    RemoveBillItem,
    DismissNotification,
}

impl RowAction {
    pub fn options_for(screen: ScreenKind) -> Vec<Self> {
        match screen {
            ScreenKind::Trips => TripStatus::ALL.map(Self::SetTripStatus).to_vec(),
            ScreenKind::Issues => IssueStatus::ALL.map(Self::SetIssueStatus).to_vec(),
            ScreenKind::Invoices => InvoiceStatus::ALL.map(Self::SetInvoiceStatus).to_vec(),
            ScreenKind::Jobs => JobStatus::ALL.map(Self::SetJobStatus).to_vec(),
            ScreenKind::Billing => vec![Self::RemoveBillItem],
            ScreenKind::Notifications => vec![Self::DismissNotification],
            ScreenKind::Vehicles | ScreenKind::Help => Vec::new(),
        }
    }

    pub fn label(self) -> String {
        match self {
            Self::SetTripStatus(status) => format!("mark {}", status.label()),
            Self::SetIssueStatus(status) => format!("mark {}", status.label()),
            Self::SetInvoiceStatus(status) => format!("mark {}", status.label()),
            Self::SetJobStatus(status) => format!("mark {}", status.label()),
            Self::RemoveBillItem => "remove item".to_owned(),
            Self::DismissNotification => "dismiss".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trip {
    pub id: TripId,
    pub code: String,
    pub trip_date: Date,
    pub start_location: String,
    pub end_location: String,
    pub distance_km: i64,
    pub duration_minutes: i64,
    pub avg_speed_kmh: i64,
    pub energy_kwh: i64,
    pub cost_paise: i64,
    pub status: TripStatus,
    pub notes: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Trip {
    pub fn route(&self) -> String {
        format!("{} → {}", self.start_location, self.end_location)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleIssue {
    pub id: IssueId,
    pub code: String,
    pub vehicle_no: String,
    pub error_code: String,
    pub category: String,
    pub description: String,
    pub reported_on: Date,
    pub resolved_on: Option<Date>,
    pub severity: Severity,
    pub status: IssueStatus,
    pub assignee: String,
    pub cost_paise: Option<i64>,
    pub notes: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub number: String,
    pub vehicle_no: String,
    pub customer: String,
    pub service: String,
    pub issued_on: Date,
    pub amount_paise: i64,
    pub status: InvoiceStatus,
    pub created_at: OffsetDateTime,
}

/// Formats the sequence number used for invoice numbers, e.g. `#00007`.
pub fn invoice_number(sequence: i64) -> String {
    format!("#{sequence:05}")
}

/// Parses `#00007` back into its sequence number.
pub fn invoice_sequence(number: &str) -> Option<i64> {
    number.trim().trim_start_matches('#').parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub code: String,
    pub task: String,
    pub assignee: String,
    pub starts_at: PrimitiveDateTime,
    pub deadline: PrimitiveDateTime,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub created_at: OffsetDateTime,
}

impl Job {
    pub fn sla_remaining(&self, now: PrimitiveDateTime) -> Duration {
        self.deadline - now
    }

    pub fn sla(&self, now: PrimitiveDateTime) -> SlaStatus {
        SlaStatus::evaluate(self.deadline, now)
    }
}

const LOW_CHARGE_PERCENT: i64 = 20;
const DEGRADED_HEALTH_PERCENT: i64 = 80;
const OVERHEAT_CELSIUS: i64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryCondition {
    Good,
    LowCharge,
    Degraded,
    Overheating,
}

impl BatteryCondition {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::LowCharge => "Low Charge",
            Self::Degraded => "Degraded",
            Self::Overheating => "Overheating",
        }
    }

    pub fn needs_attention(self) -> bool {
        self != Self::Good
    }
}

/// One battery telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub charge_percent: i64,
    pub health_percent: i64,
    pub temperature_c: i64,
    pub capacity_kwh: i64,
    pub range_km: i64,
    pub recorded_at: PrimitiveDateTime,
}

impl BatteryReading {
    /// Heat outranks wear, and wear outranks a low charge.
    pub fn condition(&self) -> BatteryCondition {
        if self.temperature_c >= OVERHEAT_CELSIUS {
            BatteryCondition::Overheating
        } else if self.health_percent < DEGRADED_HEALTH_PERCENT {
            BatteryCondition::Degraded
        } else if self.charge_percent < LOW_CHARGE_PERCENT {
            BatteryCondition::LowCharge
        } else {
            BatteryCondition::Good
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub code: String,
    pub registration_no: String,
    pub model: String,
    pub colour: String,
    pub owner: String,
    /// Latest reading by `recorded_at`.
    pub battery: Option<BatteryReading>,
    pub created_at: OffsetDateTime,
}

impl Vehicle {
    pub fn condition(&self) -> Option<BatteryCondition> {
        self.battery.as_ref().map(BatteryReading::condition)
    }

    pub fn needs_attention(&self) -> bool {
        self.condition().is_some_and(BatteryCondition::needs_attention)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillItem {
    pub id: BillItemId,
    pub name: String,
    pub quantity: i64,
    pub rate_paise: i64,
    pub tax_percent: i64,
    pub created_at: OffsetDateTime,
}

impl BillItem {
    pub fn line_total(&self) -> i64 {
        self.quantity.saturating_mul(self.rate_paise)
    }

    pub fn line_tax(&self) -> i64 {
        self.line_total().saturating_mul(self.tax_percent) / 100
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BillSummary {
    pub items: usize,
    pub subtotal_paise: i64,
    pub tax_paise: i64,
    pub total_paise: i64,
}

impl BillSummary {
    pub fn from_items(items: &[BillItem]) -> Self {
        let subtotal_paise = items.iter().map(BillItem::line_total).sum::<i64>();
        let tax_paise = items.iter().map(BillItem::line_tax).sum::<i64>();
        Self {
            items: items.len(),
            subtotal_paise,
            tax_paise,
            total_paise: subtotal_paise + tax_paise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price_paise: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpArticle {
    pub id: HelpArticleId,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: SupportTicketId,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub severity: Severity,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub role: Role,
    pub email: String,
    pub phone: String,
    pub username: String,
    pub created_on: Date,
    pub last_login: Option<Date>,
    pub active: bool,
    pub bio: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FleetSummary {
    pub open_issues: usize,
    pub pending_invoices: usize,
    pub pending_amount_paise: i64,
    pub jobs_at_risk: usize,
    pub jobs_breached: usize,
    pub vehicles_needing_attention: usize,
}
