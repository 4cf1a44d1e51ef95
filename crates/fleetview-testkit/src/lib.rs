// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use fleetview_app::{
    BatteryReadingForm, BillItemForm, IssueForm, IssueStatus, JobForm, JobPriority, JobStatus,
    Severity, TripForm, TripStatus, VehicleForm,
};
use std::path::PathBuf;
use time::macros::datetime;
use time::{Date, Duration, PrimitiveDateTime};

const CITIES: [&str; 14] = [
    "Chennai",
    "Bangalore",
    "Coimbatore",
    "Ooty",
    "Madurai",
    "Rameswaram",
    "Salem",
    "Trichy",
    "Erode",
    "Tirunelveli",
    "Kanyakumari",
    "Vellore",
    "Pondicherry",
    "Hosur",
];

const ISSUE_CATEGORIES: [(&str, &str, &[&str]); 5] = [
    (
        "Battery",
        "BMS",
        &[
            "Battery temperature exceeded safe threshold",
            "Cell voltage imbalance detected",
        ],
    ),
    (
        "Motor Controller",
        "MCU",
        &[
            "Motor controller communication failure",
            "Inverter overcurrent trip",
        ],
    ),
    (
        "Charging",
        "CHG",
        &[
            "Charging interrupted due to voltage fluctuation",
            "Onboard charger not detected",
        ],
    ),
    (
        "Brakes",
        "BRK",
        &["Regenerative braking disabled", "Brake pad wear warning"],
    ),
    (
        "Telematics",
        "TEL",
        &["GPS signal lost for over an hour", "Telemetry upload stalled"],
    ),
];

const TECHNICIANS: [&str; 8] = [
    "John Doe",
    "Jane Smith",
    "Alex Brown",
    "Emma White",
    "Arjun Rao",
    "Divya Iyer",
    "Karthik Raman",
    "Meena Pillai",
];

const TASKS: [&str; 8] = [
    "Inspect Vehicle",
    "Load Cargo",
    "Delivery Check",
    "Unload Materials",
    "Battery Swap",
    "Tyre Rotation",
    "Firmware Update",
    "Charger Calibration",
];

const EV_MODELS: [(&str, i64); 6] = [
    ("Tata Nexon EV", 40),
    ("MG ZS EV", 50),
    ("Mahindra XUV400", 39),
    ("Hyundai Kona Electric", 39),
    ("Tata Tiago EV", 24),
    ("BYD Atto 3", 60),
];

const COLOURS: [&str; 5] = ["Pristine White", "Candy White", "Napoli Black", "Fiery Red", "Grey"];

const OWNERS: [&str; 6] = [
    "Rahul Sharma",
    "Ananya Patel",
    "Amit Verma",
    "Meera Das",
    "Ravi Teja",
    "Kavya Nair",
];

const STATE_CODES: [&str; 5] = ["TN", "KA", "MH", "KL", "AP"];

const SERVICES: [(&str, i64); 6] = [
    ("Engine Service", 150_000),
    ("Oil Change", 80_000),
    ("Trip Charge", 200_000),
    ("Battery Check", 450_000),
    ("Wheel Alignment", 150_000),
    ("Software Update", 120_000),
];

const TRIP_NOTES: [&str; 6] = [
    "Smooth highway drive",
    "Hilly road with heavy traffic",
    "Pleasant coastal drive",
    "Minor traffic near city limits",
    "Short and scenic trip",
    "Rain slowed the last stretch",
];

const TRIP_STATUSES: [TripStatus; 3] = TripStatus::ALL;
const SEVERITIES: [Severity; 3] = Severity::ALL;
const ISSUE_STATUSES: [IssueStatus; 3] = IssueStatus::ALL;
const PRIORITIES: [JobPriority; 3] = JobPriority::ALL;
const JOB_STATUSES: [JobStatus; 3] = JobStatus::ALL;

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

/// Seeded generator for fleet records. The same seed always yields the same
/// sequence of values.
#[derive(Debug, Clone)]
pub struct FleetFaker {
    rng: DeterministicRng,
}

impl FleetFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
        }
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    pub fn vehicle_no(&mut self) -> String {
        format!("EV-{}", self.int_range(1000, 1999))
    }

    pub fn trip(&mut self) -> TripForm {
        let start = self.pick(&CITIES);
        let mut end = self.pick(&CITIES);
        while end == start {
            end = self.pick(&CITIES);
        }
        let distance_km = self.int_range(20, 450);
        let duration_minutes = self.int_range(30, 600);
        TripForm {
            code: String::new(),
            trip_date: self.date_around(reference_day(), 60),
            start_location: start.to_owned(),
            end_location: end.to_owned(),
            distance_km,
            duration_minutes,
            energy_kwh: (distance_km / 14).max(1),
            cost_paise: self.int_range(500, 4_000) * 100,
            status: TRIP_STATUSES[self.rng.int_n(TRIP_STATUSES.len())],
            notes: self.pick(&TRIP_NOTES).to_owned(),
        }
    }

    pub fn issue(&mut self) -> IssueForm {
        let (category, prefix, descriptions) =
            ISSUE_CATEGORIES[self.rng.int_n(ISSUE_CATEGORIES.len())];
        let status = ISSUE_STATUSES[self.rng.int_n(ISSUE_STATUSES.len())];
        let assignee = if status == IssueStatus::Open && self.rng.bool() {
            String::new()
        } else {
            self.pick(&TECHNICIANS).to_owned()
        };
        let cost_paise = (status == IssueStatus::Resolved)
            .then(|| self.int_range(500, 20_000) * 100);

        IssueForm {
            vehicle_no: self.vehicle_no(),
            error_code: format!("{prefix}-{:03}", self.int_range(1, 99)),
            category: category.to_owned(),
            description: self.pick(descriptions).to_owned(),
            reported_on: self.date_around(reference_day(), 30),
            severity: SEVERITIES[self.rng.int_n(SEVERITIES.len())],
            status,
            assignee,
            cost_paise,
            notes: String::new(),
        }
    }

    pub fn job(&mut self) -> JobForm {
        let offset = Duration::hours(self.int_range(0, 8));
        self.job_starting(reference_now() + offset)
    }

    pub fn job_starting(&mut self, starts_at: PrimitiveDateTime) -> JobForm {
        JobForm {
            task: self.pick(&TASKS).to_owned(),
            assignee: self.pick(&TECHNICIANS).to_owned(),
            starts_at,
            deadline: starts_at + Duration::hours(self.int_range(1, 5)),
            priority: PRIORITIES[self.rng.int_n(PRIORITIES.len())],
            status: JOB_STATUSES[self.rng.int_n(JOB_STATUSES.len())],
        }
    }

    pub fn bill_item(&mut self) -> BillItemForm {
        let (name, rate_paise) = SERVICES[self.rng.int_n(SERVICES.len())];
        BillItemForm {
            name: name.to_owned(),
            quantity: self.int_range(1, 3),
            rate_paise,
            tax_percent: [0, 5, 12, 18][self.rng.int_n(4)],
        }
    }

    /// A vehicle with a blank code so the store assigns one.
    pub fn vehicle(&mut self) -> VehicleForm {
        let (model, _) = EV_MODELS[self.rng.int_n(EV_MODELS.len())];
        let letters = [b'A' + self.rng.int_n(26) as u8, b'A' + self.rng.int_n(26) as u8];
        VehicleForm {
            code: String::new(),
            registration_no: format!(
                "{}{:02} {} {}",
                self.pick(&STATE_CODES),
                self.int_range(1, 99),
                String::from_utf8_lossy(&letters),
                self.int_range(1000, 9999)
            ),
            model: model.to_owned(),
            colour: self.pick(&COLOURS).to_owned(),
            owner: self.pick(&OWNERS).to_owned(),
        }
    }

    pub fn battery_reading(&mut self, code: &str, vehicle_code: &str) -> BatteryReadingForm {
        let (_, capacity_kwh) = EV_MODELS[self.rng.int_n(EV_MODELS.len())];
        let charge_percent = self.int_range(5, 100);
        BatteryReadingForm {
            code: code.to_owned(),
            vehicle_code: vehicle_code.to_owned(),
            charge_percent,
            health_percent: self.int_range(70, 100),
            temperature_c: self.int_range(20, 50),
            capacity_kwh,
            range_km: capacity_kwh * charge_percent * 6 / 100,
            recorded_at: reference_now() - Duration::minutes(self.int_range(0, 600)),
        }
    }

    pub fn technician(&mut self) -> String {
        self.pick(&TECHNICIANS).to_owned()
    }

    fn pick<'a>(&mut self, items: &'a [&'a str]) -> &'a str {
        items[self.rng.int_n(items.len())]
    }

    fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = max - min + 1;
        min + (self.rng.next_u64() % (span as u64)) as i64
    }

    fn date_around(&mut self, center: Date, spread_days: i64) -> Date {
        center - Duration::days(self.int_range(0, spread_days))
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("fleetview.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-01-23T12:34:56Z"
}

/// Wall clock used by fixtures that evaluate job deadlines.
pub fn reference_now() -> PrimitiveDateTime {
    datetime!(2026-01-23 09:00)
}

pub fn reference_day() -> Date {
    reference_now().date()
}

pub fn technicians() -> &'static [&'static str] {
    &TECHNICIANS
}
