// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use time::{Date, PrimitiveDateTime};

use crate::validation::{
    DATE_LAYOUT, DATETIME_LAYOUT, ValidationError, parse_datetime_minutes, parse_duration_minutes,
    parse_optional_int, parse_optional_paise, parse_required_date, parse_required_int,
    parse_required_paise,
};
use crate::{FormKind, IssueStatus, JobPriority, JobStatus, Role, Severity, TripStatus, UserProfile};

const MAX_TAX_PERCENT: i64 = 100;
const MAX_PERFORMANCE: u8 = 10;
const MAX_PERCENT: i64 = 100;
/// Plausible pack temperatures in °C; anything outside is a sensor fault.
const BATTERY_TEMPERATURE_RANGE: std::ops::RangeInclusive<i64> = -40..=120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripForm {
    /// Blank lets the store assign the next `TRIPnnn` code.
    pub code: String,
    pub trip_date: Date,
    pub start_location: String,
    pub end_location: String,
    pub distance_km: i64,
    pub duration_minutes: i64,
    pub energy_kwh: i64,
    pub cost_paise: i64,
    pub status: TripStatus,
    pub notes: String,
}

impl TripForm {
    pub fn avg_speed_kmh(&self) -> i64 {
        if self.duration_minutes <= 0 {
            return 0;
        }
        self.distance_km * 60 / self.duration_minutes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueForm {
    pub vehicle_no: String,
    pub error_code: String,
    pub category: String,
    pub description: String,
    pub reported_on: Date,
    pub severity: Severity,
    pub status: IssueStatus,
    pub assignee: String,
    pub cost_paise: Option<i64>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleForm {
    /// Blank lets the store assign the next `VEHnnn` code.
    pub code: String,
    pub registration_no: String,
    pub model: String,
    pub colour: String,
    pub owner: String,
}

/// A battery sample for the vehicle with `vehicle_code`; `code` keys
/// repeated syncs of the same sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatteryReadingForm {
    pub code: String,
    pub vehicle_code: String,
    pub charge_percent: i64,
    pub health_percent: i64,
    pub temperature_c: i64,
    pub capacity_kwh: i64,
    pub range_km: i64,
    pub recorded_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobForm {
    pub task: String,
    pub assignee: String,
    pub starts_at: PrimitiveDateTime,
    pub deadline: PrimitiveDateTime,
    pub priority: JobPriority,
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillItemForm {
    pub name: String,
    pub quantity: i64,
    pub rate_paise: i64,
    pub tax_percent: i64,
}

/// Turns the current bill into a pending invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceForm {
    pub customer: String,
    pub vehicle_no: String,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportTicketForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub bio: String,
}

impl ProfileForm {
    pub fn from_profile(profile: &UserProfile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            bio: profile.bio.clone(),
        }
    }

    /// Raw field values in form order, for prefilling the editor.
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.email.clone(),
            self.phone.clone(),
            self.bio.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub role: Role,
    pub performance: u8,
    pub terms_accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangePasswordInput {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormField {
    pub label: &'static str,
    pub hint: &'static str,
}

const fn field(label: &'static str, hint: &'static str) -> FormField {
    FormField { label, hint }
}

const TRIP_FIELDS: [FormField; 10] = [
    field("code", "blank assigns the next code"),
    field("date", DATE_LAYOUT),
    field("from", "start location"),
    field("to", "end location"),
    field("distance km", "whole kilometres"),
    field("duration", "e.g. 6h 30m"),
    field("energy kWh", "whole kWh"),
    field("cost", "e.g. 2,800"),
    field("status", "completed / ongoing / cancelled"),
    field("notes", ""),
];

const ISSUE_FIELDS: [FormField; 10] = [
    field("vehicle", "e.g. EV-1023"),
    field("error code", "e.g. BMS-021"),
    field("category", "e.g. Battery"),
    field("description", ""),
    field("reported", DATE_LAYOUT),
    field("severity", "low / medium / high"),
    field("status", "open / in progress / resolved"),
    field("assignee", ""),
    field("cost", "optional"),
    field("notes", ""),
];

const VEHICLE_FIELDS: [FormField; 5] = [
    field("code", "blank assigns the next code"),
    field("registration", "e.g. TN09 AB 1234"),
    field("model", "e.g. Tata Nexon EV"),
    field("colour", ""),
    field("owner", ""),
];

const JOB_FIELDS: [FormField; 6] = [
    field("task", ""),
    field("assignee", ""),
    field("start", DATETIME_LAYOUT),
    field("deadline", DATETIME_LAYOUT),
    field("priority", "critical / high / normal"),
    field("status", "assigned / in progress / completed"),
];

const BILL_ITEM_FIELDS: [FormField; 4] = [
    field("item", "product or service name"),
    field("qty", "blank means 1"),
    field("rate", "e.g. 1,500"),
    field("tax %", "blank means 0"),
];

const INVOICE_FIELDS: [FormField; 3] = [
    field("customer", ""),
    field("vehicle", "e.g. TN09 AB 1234"),
    field("service", "e.g. General Service"),
];

const SUPPORT_TICKET_FIELDS: [FormField; 4] = [
    field("name", ""),
    field("email", ""),
    field("subject", ""),
    field("message", ""),
];

const PROFILE_FIELDS: [FormField; 4] = [
    field("name", ""),
    field("email", ""),
    field("phone", ""),
    field("bio", ""),
];

pub fn fields_for(kind: FormKind) -> &'static [FormField] {
    match kind {
        FormKind::Trip => &TRIP_FIELDS,
        FormKind::Issue => &ISSUE_FIELDS,
        FormKind::Vehicle => &VEHICLE_FIELDS,
        FormKind::Job => &JOB_FIELDS,
        FormKind::BillItem => &BILL_ITEM_FIELDS,
        FormKind::Invoice => &INVOICE_FIELDS,
        FormKind::SupportTicket => &SUPPORT_TICKET_FIELDS,
        FormKind::Profile => &PROFILE_FIELDS,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPayload {
    Trip(TripForm),
    Issue(IssueForm),
    Vehicle(VehicleForm),
    Job(JobForm),
    BillItem(BillItemForm),
    Invoice(InvoiceForm),
    SupportTicket(SupportTicketForm),
    Profile(ProfileForm),
}

impl FormPayload {
    pub fn kind(&self) -> FormKind {
        match self {
            Self::Trip(_) => FormKind::Trip,
            Self::Issue(_) => FormKind::Issue,
            Self::Vehicle(_) => FormKind::Vehicle,
            Self::Job(_) => FormKind::Job,
            Self::BillItem(_) => FormKind::BillItem,
            Self::Invoice(_) => FormKind::Invoice,
            Self::SupportTicket(_) => FormKind::SupportTicket,
            Self::Profile(_) => FormKind::Profile,
        }
    }

    /// Parses raw editor text, one entry per field of `fields_for(kind)`.
    pub fn from_fields(kind: FormKind, values: &[String]) -> Result<Self> {
        let raw = RawFields(values);
        let payload = match kind {
            FormKind::Trip => Self::Trip(TripForm {
                code: raw.text(0),
                trip_date: raw.parse(1, "trip date", parse_required_date)?,
                start_location: raw.text(2),
                end_location: raw.text(3),
                distance_km: raw.parse(4, "trip distance", parse_required_int)?,
                duration_minutes: raw.parse(5, "trip duration", parse_duration_minutes)?,
                energy_kwh: raw.parse(6, "trip energy", parse_optional_int)?,
                cost_paise: raw.parse(7, "trip cost", parse_required_paise)?,
                status: raw.choice(8, "trip status", TripStatus::Ongoing, TripStatus::parse)?,
                notes: raw.text(9),
            }),
            FormKind::Issue => Self::Issue(IssueForm {
                vehicle_no: raw.text(0),
                error_code: raw.text(1),
                category: raw.text(2),
                description: raw.text(3),
                reported_on: raw.parse(4, "issue date", parse_required_date)?,
                severity: raw.choice(5, "issue severity", Severity::Medium, Severity::parse)?,
                status: raw.choice(6, "issue status", IssueStatus::Open, IssueStatus::parse)?,
                assignee: raw.text(7),
                cost_paise: raw.parse(8, "issue cost", parse_optional_paise)?,
                notes: raw.text(9),
            }),
            FormKind::Vehicle => Self::Vehicle(VehicleForm {
                code: raw.text(0),
                registration_no: raw.text(1),
                model: raw.text(2),
                colour: raw.text(3),
                owner: raw.text(4),
            }),
            FormKind::Job => Self::Job(JobForm {
                task: raw.text(0),
                assignee: raw.text(1),
                starts_at: raw.parse(2, "job start", parse_datetime_minutes)?,
                deadline: raw.parse(3, "job deadline", parse_datetime_minutes)?,
                priority: raw.choice(4, "job priority", JobPriority::Normal, JobPriority::parse)?,
                status: raw.choice(5, "job status", JobStatus::Assigned, JobStatus::parse)?,
            }),
            FormKind::BillItem => Self::BillItem(BillItemForm {
                name: raw.text(0),
                quantity: if raw.is_blank(1) {
                    1
                } else {
                    raw.parse(1, "quantity", parse_required_int)?
                },
                rate_paise: raw.parse(2, "rate", parse_required_paise)?,
                tax_percent: raw.parse(3, "tax", parse_optional_int)?,
            }),
            FormKind::Invoice => Self::Invoice(InvoiceForm {
                customer: raw.text(0),
                vehicle_no: raw.text(1),
                service: raw.text(2),
            }),
            FormKind::SupportTicket => Self::SupportTicket(SupportTicketForm {
                name: raw.text(0),
                email: raw.text(1),
                subject: raw.text(2),
                message: raw.text(3),
            }),
            FormKind::Profile => Self::Profile(ProfileForm {
                name: raw.text(0),
                email: raw.text(1),
                phone: raw.text(2),
                bio: raw.text(3),
            }),
        };
        Ok(payload)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Trip(trip) => trip.validate(),
            Self::Issue(issue) => issue.validate(),
            Self::Vehicle(vehicle) => vehicle.validate(),
            Self::Job(job) => job.validate(),
            Self::BillItem(item) => item.validate(),
            Self::Invoice(invoice) => invoice.validate(),
            Self::SupportTicket(ticket) => ticket.validate(),
            Self::Profile(profile) => profile.validate(),
        }
    }
}

struct RawFields<'a>(&'a [String]);

impl RawFields<'_> {
    fn raw(&self, index: usize) -> &str {
        self.0.get(index).map(String::as_str).unwrap_or_default()
    }

    fn text(&self, index: usize) -> String {
        self.raw(index).trim().to_owned()
    }

    fn is_blank(&self, index: usize) -> bool {
        self.raw(index).trim().is_empty()
    }

    fn parse<T>(
        &self,
        index: usize,
        label: &str,
        parser: fn(&str) -> Result<T, ValidationError>,
    ) -> Result<T> {
        let value = self.raw(index);
        parser(value).map_err(|error| anyhow!("{label}: {error} {value:?} -- fix the value and retry"))
    }

    fn choice<T>(
        &self,
        index: usize,
        label: &str,
        default: T,
        parser: fn(&str) -> Option<T>,
    ) -> Result<T> {
        let value = self.raw(index);
        if value.trim().is_empty() {
            return Ok(default);
        }
        parser(value).ok_or_else(|| {
            anyhow!(
                "{label} {value:?} is not recognized -- use one of the listed values and retry"
            )
        })
    }
}

impl TripForm {
    pub fn validate(&self) -> Result<()> {
        if self.start_location.trim().is_empty() || self.end_location.trim().is_empty() {
            bail!("trip route is required -- enter both locations and retry");
        }
        if self.distance_km < 0 {
            bail!("trip distance cannot be negative");
        }
        if self.duration_minutes <= 0 {
            bail!("trip duration must be positive -- enter a duration like 6h 30m");
        }
        if self.energy_kwh < 0 {
            bail!("trip energy cannot be negative");
        }
        if self.cost_paise < 0 {
            bail!("trip cost cannot be negative");
        }
        Ok(())
    }
}

impl IssueForm {
    pub fn validate(&self) -> Result<()> {
        if self.vehicle_no.trim().is_empty() {
            bail!("issue vehicle is required -- enter a vehicle number and retry");
        }
        if self.description.trim().is_empty() {
            bail!("issue description is required -- describe the fault and retry");
        }
        if let Some(cost) = self.cost_paise
            && cost < 0
        {
            bail!("issue cost cannot be negative");
        }
        Ok(())
    }
}

impl VehicleForm {
    pub fn validate(&self) -> Result<()> {
        if self.registration_no.trim().is_empty() {
            bail!("vehicle registration is required -- enter the number plate and retry");
        }
        if self.model.trim().is_empty() {
            bail!("vehicle model is required -- enter the make and model and retry");
        }
        Ok(())
    }
}

impl BatteryReadingForm {
    pub fn validate(&self) -> Result<()> {
        if self.code.trim().is_empty() {
            bail!("battery reading code is required");
        }
        if self.vehicle_code.trim().is_empty() {
            bail!("battery reading {} has no vehicle", self.code.trim());
        }
        if !(0..=MAX_PERCENT).contains(&self.charge_percent) {
            bail!("battery charge must be between 0 and {MAX_PERCENT} percent");
        }
        if !(0..=MAX_PERCENT).contains(&self.health_percent) {
            bail!("battery health must be between 0 and {MAX_PERCENT} percent");
        }
        if !BATTERY_TEMPERATURE_RANGE.contains(&self.temperature_c) {
            bail!(
                "battery temperature {}°C is outside {}..={}°C",
                self.temperature_c,
                BATTERY_TEMPERATURE_RANGE.start(),
                BATTERY_TEMPERATURE_RANGE.end()
            );
        }
        if self.capacity_kwh < 0 || self.range_km < 0 {
            bail!("battery capacity and range cannot be negative");
        }
        Ok(())
    }
}

impl JobForm {
    pub fn validate(&self) -> Result<()> {
        if self.task.trim().is_empty() {
            bail!("job task is required -- enter a task name and retry");
        }
        if self.assignee.trim().is_empty() {
            bail!("job assignee is required -- enter who owns the job and retry");
        }
        if self.deadline <= self.starts_at {
            bail!("job deadline must be after the start time");
        }
        Ok(())
    }
}

impl BillItemForm {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("bill item name is required -- enter a product name and retry");
        }
        if self.quantity < 1 {
            bail!("bill item quantity must be at least 1");
        }
        if self.rate_paise <= 0 {
            bail!("bill item rate must be positive");
        }
        if !(0..=MAX_TAX_PERCENT).contains(&self.tax_percent) {
            bail!("bill item tax must be between 0 and {MAX_TAX_PERCENT} percent");
        }
        Ok(())
    }
}

impl InvoiceForm {
    pub fn validate(&self) -> Result<()> {
        if self.customer.trim().is_empty() {
            bail!("invoice customer is required -- enter a customer name and retry");
        }
        if self.vehicle_no.trim().is_empty() {
            bail!("invoice vehicle is required -- enter a vehicle number and retry");
        }
        if self.service.trim().is_empty() {
            bail!("invoice service is required -- describe the service and retry");
        }
        Ok(())
    }
}

impl SupportTicketForm {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("support ticket name is required -- enter your name and retry");
        }
        check_email("support ticket", &self.email)?;
        if self.message.trim().is_empty() {
            bail!("support ticket message is required -- describe the problem and retry");
        }
        Ok(())
    }
}

impl ProfileForm {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("profile name is required -- enter a name and retry");
        }
        check_email("profile", &self.email)
    }
}

impl LoginInput {
    pub fn validate(&self) -> Result<()> {
        if self.email.trim().is_empty() {
            bail!("email is required -- enter your email and retry");
        }
        if self.password.is_empty() {
            bail!("password is required -- enter your password and retry");
        }
        Ok(())
    }
}

impl RegistrationInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("name is required -- enter your name and retry");
        }
        check_email("registration", &self.email)?;
        if self.password.is_empty() {
            bail!("password is required -- choose a password and retry");
        }
        if self.password != self.password_confirm {
            bail!("passwords do not match -- retype the confirmation and retry");
        }
        if self.performance > MAX_PERFORMANCE {
            bail!("performance must be between 0 and {MAX_PERFORMANCE}");
        }
        if !self.terms_accepted {
            bail!("terms must be accepted before registering");
        }
        Ok(())
    }
}

impl ChangePasswordInput {
    pub fn validate(&self) -> Result<()> {
        if self.old_password.is_empty() {
            bail!("current password is required -- enter it and retry");
        }
        if self.new_password.is_empty() {
            bail!("new password is required -- choose a password and retry");
        }
        if self.new_password != self.new_password_confirm {
            bail!("new passwords do not match -- retype the confirmation and retry");
        }
        Ok(())
    }
}

fn check_email(owner: &str, email: &str) -> Result<()> {
    let email = email.trim();
    if email.is_empty() {
        bail!("{owner} email is required -- enter an email and retry");
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => bail!("{owner} email {email:?} is not valid -- use name@example.com"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn every_form_kind_has_fields() {
        for kind in [
            FormKind::Trip,
            FormKind::Issue,
            FormKind::Vehicle,
            FormKind::Job,
            FormKind::BillItem,
            FormKind::Invoice,
            FormKind::SupportTicket,
            FormKind::Profile,
        ] {
            assert!(!fields_for(kind).is_empty(), "{kind:?}");
        }
    }

    #[test]
    fn trip_fields_parse_into_payload() -> Result<()> {
        let values = strings(&[
            "",
            "2026-01-05",
            "Chennai",
            "Bangalore",
            "346",
            "6h 30m",
            "24",
            "₹2,800",
            "completed",
            "Smooth highway drive",
        ]);
        let payload = FormPayload::from_fields(FormKind::Trip, &values)?;
        let FormPayload::Trip(trip) = &payload else {
            panic!("expected trip payload, got {payload:?}");
        };
        assert_eq!(trip.trip_date, date!(2026 - 01 - 05));
        assert_eq!(trip.duration_minutes, 390);
        assert_eq!(trip.cost_paise, 280_000);
        assert_eq!(trip.status, TripStatus::Completed);
        assert_eq!(trip.avg_speed_kmh(), 53);
        payload.validate()?;
        Ok(())
    }

    #[test]
    fn parse_errors_name_the_field() {
        let values = strings(&["", "05/01/2026", "A", "B", "1", "1h", "", "1", "", ""]);
        let error = FormPayload::from_fields(FormKind::Trip, &values).expect_err("bad date");
        assert!(error.to_string().contains("trip date"), "{error}");

        let values = strings(&["EV-1", "", "", "x", "2026-01-10", "severe"]);
        let error = FormPayload::from_fields(FormKind::Issue, &values).expect_err("bad severity");
        assert!(error.to_string().contains("issue severity"), "{error}");
    }

    #[test]
    fn blank_choices_use_defaults() -> Result<()> {
        let values = strings(&["EV-1023", "", "", "overheating", "2026-01-10"]);
        let FormPayload::Issue(issue) = FormPayload::from_fields(FormKind::Issue, &values)? else {
            panic!("expected issue payload");
        };
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.status, IssueStatus::Open);
        assert_eq!(issue.cost_paise, None);
        issue.validate()?;
        Ok(())
    }

    #[test]
    fn job_deadline_must_follow_start() -> Result<()> {
        let values = strings(&[
            "Inspect Vehicle",
            "John Doe",
            "2026-01-23 12:00",
            "2026-01-23 09:00",
        ]);
        let payload = FormPayload::from_fields(FormKind::Job, &values)?;
        assert!(payload.validate().is_err());

        let job = JobForm {
            task: "Inspect Vehicle".to_owned(),
            assignee: "John Doe".to_owned(),
            starts_at: datetime!(2026-01-23 09:00),
            deadline: datetime!(2026-01-23 12:00),
            priority: JobPriority::Critical,
            status: JobStatus::Assigned,
        };
        job.validate()?;
        Ok(())
    }

    #[test]
    fn vehicle_fields_require_registration_and_model() -> Result<()> {
        let values = strings(&["", " KA05 CD 8899 ", "MG ZS EV", "", "Ananya Patel"]);
        let payload = FormPayload::from_fields(FormKind::Vehicle, &values)?;
        let FormPayload::Vehicle(vehicle) = &payload else {
            panic!("expected vehicle payload, got {payload:?}");
        };
        assert_eq!(vehicle.registration_no, "KA05 CD 8899");
        assert!(vehicle.code.is_empty());
        payload.validate()?;

        let values = strings(&["", "", "MG ZS EV"]);
        let error = FormPayload::from_fields(FormKind::Vehicle, &values)?
            .validate()
            .expect_err("blank registration");
        assert!(error.to_string().contains("registration"), "{error}");
        Ok(())
    }

    #[test]
    fn battery_reading_bounds() {
        let reading = BatteryReadingForm {
            code: "STAT001".to_owned(),
            vehicle_code: "VEH001".to_owned(),
            charge_percent: 100,
            health_percent: 0,
            temperature_c: -40,
            capacity_kwh: 40,
            range_km: 0,
            recorded_at: datetime!(2026-01-23 09:00),
        };
        assert!(reading.validate().is_ok());

        let overcharged = BatteryReadingForm {
            charge_percent: 101,
            ..reading.clone()
        };
        assert!(overcharged.validate().is_err());
        let scorched = BatteryReadingForm {
            temperature_c: 121,
            ..reading.clone()
        };
        assert!(scorched.validate().is_err());
        let orphan = BatteryReadingForm {
            vehicle_code: " ".to_owned(),
            ..reading
        };
        let error = orphan.validate().expect_err("no vehicle");
        assert!(error.to_string().contains("STAT001"), "{error}");
    }

    #[test]
    fn bill_item_defaults_and_bounds() -> Result<()> {
        let FormPayload::BillItem(item) =
            FormPayload::from_fields(FormKind::BillItem, &strings(&["Oil Change", "", "800"]))?
        else {
            panic!("expected bill item payload");
        };
        assert_eq!(item.quantity, 1);
        assert_eq!(item.tax_percent, 0);
        item.validate()?;

        let taxed = BillItemForm {
            tax_percent: 101,
            ..item.clone()
        };
        assert!(taxed.validate().is_err());
        let free = BillItemForm {
            rate_paise: 0,
            ..item
        };
        assert!(free.validate().is_err());
        Ok(())
    }

    #[test]
    fn invoice_requires_customer_and_vehicle() {
        let invoice = InvoiceForm {
            customer: " ".to_owned(),
            vehicle_no: "TN09 AB 1234".to_owned(),
            service: "Battery Check".to_owned(),
        };
        let error = invoice.validate().expect_err("blank customer");
        assert!(error.to_string().contains("customer"));
    }

    #[test]
    fn support_ticket_checks_email() {
        let ticket = SupportTicketForm {
            name: "Saranya".to_owned(),
            email: "saranya.example.com".to_owned(),
            subject: "Sync".to_owned(),
            message: "Live data stopped".to_owned(),
        };
        assert!(ticket.validate().is_err());
        let ticket = SupportTicketForm {
            email: "saranya@example.com".to_owned(),
            ..ticket
        };
        assert!(ticket.validate().is_ok());
    }

    #[test]
    fn profile_form_round_trips_through_fields() -> Result<()> {
        let profile = ProfileForm {
            name: "Saranya Prasad".to_owned(),
            email: "saranya.prasad@example.com".to_owned(),
            phone: "+91 9876543210".to_owned(),
            bio: "Fleet admin".to_owned(),
        };
        let parsed = FormPayload::from_fields(FormKind::Profile, &profile.to_fields())?;
        assert_eq!(parsed, FormPayload::Profile(profile));
        Ok(())
    }

    #[test]
    fn registration_requires_matching_passwords_and_terms() {
        let input = RegistrationInput {
            name: "Ravi Teja".to_owned(),
            email: "ravi@example.com".to_owned(),
            password: "secret".to_owned(),
            password_confirm: "secret".to_owned(),
            role: Role::Personal,
            performance: 7,
            terms_accepted: true,
        };
        assert!(input.validate().is_ok());

        let mismatch = RegistrationInput {
            password_confirm: "other".to_owned(),
            ..input.clone()
        };
        assert!(mismatch.validate().is_err());

        let no_terms = RegistrationInput {
            terms_accepted: false,
            ..input.clone()
        };
        assert!(no_terms.validate().is_err());

        let too_high = RegistrationInput {
            performance: 11,
            ..input
        };
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn login_and_password_change_require_fields() {
        let login = LoginInput {
            email: "a@b.co".to_owned(),
            password: String::new(),
        };
        assert!(login.validate().is_err());

        let change = ChangePasswordInput {
            old_password: "old".to_owned(),
            new_password: "new".to_owned(),
            new_password_confirm: "nope".to_owned(),
        };
        assert!(change.validate().is_err());
    }
}
