// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(TripId);
entity_id!(IssueId);
entity_id!(InvoiceId);
entity_id!(JobId);
entity_id!(BillItemId);
entity_id!(ProductId);
entity_id!(HelpArticleId);
entity_id!(SupportTicketId);
entity_id!(NotificationId);
entity_id!(VehicleId);
