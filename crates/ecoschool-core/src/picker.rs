// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! School selection: fires the statistics and energy lookups together and
//! drops the answer if the user picked another school in the meantime.

use crate::directory::SchoolRecord;
use crate::energy::{EnergyDataset, EnergyLookup, EnergyRequest};
use crate::schoolinfo::{BasicInfo, BasicInfoRequest, Reconciler, SchoolInfoSource};
use crate::{EcoError, Result};
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};

/// Last-writer-wins token source.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

#[derive(Debug)]
pub struct Ticket<'a> {
    id: u64,
    sequencer: &'a RequestSequencer,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket<'_> {
        let id = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket {
            id,
            sequencer: self,
        }
    }
}

impl Ticket<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// False once any newer ticket has been issued.
    pub fn is_current(&self) -> bool {
        self.sequencer.latest.load(Ordering::SeqCst) == self.id
    }
}

/// Both lookups are reported; one failing never hides the other.
#[derive(Debug)]
pub struct PickResult {
    pub basic: Result<BasicInfo>,
    pub energy: Result<EnergyLookup>,
}

#[derive(Debug)]
pub enum PickOutcome {
    /// A newer pick superseded this one; its results must not be applied.
    Stale,
    Fresh(PickResult),
}

pub struct SchoolPicker<S> {
    reconciler: Option<Reconciler<S>>,
    energy: EnergyDataset,
    sequencer: RequestSequencer,
    current_year: i32,
}

impl<S: SchoolInfoSource> SchoolPicker<S> {
    /// Without a reconciler (no API key) the statistics half fails with a
    /// configuration error while energy hints still work.
    pub fn new(reconciler: Option<Reconciler<S>>, energy: EnergyDataset, current_year: i32) -> Self {
        Self {
            reconciler,
            energy,
            sequencer: RequestSequencer::new(),
            current_year,
        }
    }

    pub fn sequencer(&self) -> &RequestSequencer {
        &self.sequencer
    }

    pub fn pick(&self, record: &SchoolRecord) -> PickOutcome {
        let ticket = self.sequencer.issue();
        debug!(
            "School picked — name={} region={} level={} ticket={}",
            record.name,
            record.region,
            record.level,
            ticket.id()
        );

        let (basic, energy) = rayon::join(
            || self.lookup_basic(record),
            || {
                let request = EnergyRequest::new(&record.name)
                    .region(Some(&record.region))
                    .level(Some(&record.level));
                self.energy.lookup(&request, self.current_year)
            },
        );

        if !ticket.is_current() {
            info!("Discarding stale pick — name={} ticket={}", record.name, ticket.id());
            return PickOutcome::Stale;
        }
        PickOutcome::Fresh(PickResult { basic, energy })
    }

    fn lookup_basic(&self, record: &SchoolRecord) -> Result<BasicInfo> {
        let reconciler = self.reconciler.as_ref().ok_or_else(|| {
            EcoError::Configuration("SCHOOLINFO_API_KEY is not set".to_string())
        })?;
        let request = BasicInfoRequest::new(&record.name, &record.region, &record.level);
        reconciler.basic_info(&request, self.current_year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schoolinfo::testing::{named, FakeSource};
    use crate::schoolinfo::{ApiType, FetchOutcome};
    use crate::ErrorKind;
    use serde_json::json;

    fn record() -> SchoolRecord {
        SchoolRecord::try_from("대치초등학교|초등|강남구").unwrap()
    }

    #[test]
    fn test_newer_ticket_invalidates_older() {
        let sequencer = RequestSequencer::new();
        let first = sequencer.issue();
        assert!(first.is_current());
        let second = sequencer.issue();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_failures_are_reported_side_by_side() {
        let picker: SchoolPicker<FakeSource> =
            SchoolPicker::new(None, EnergyDataset::default(), 2025);
        let PickOutcome::Fresh(result) = picker.pick(&record()) else {
            panic!("single pick cannot be stale");
        };
        assert_eq!(result.basic.unwrap_err().kind(), ErrorKind::Configuration);
        assert_eq!(result.energy.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_fresh_pick_carries_basic_info() {
        let fake = FakeSource::default().with(
            ApiType::StudentClass,
            2025,
            FetchOutcome::Rows(vec![named("대치초등학교", json!({"COL_SUM": "40"}))]),
        );
        let picker = SchoolPicker::new(Some(Reconciler::new(fake)), EnergyDataset::default(), 2025);
        match picker.pick(&record()) {
            PickOutcome::Fresh(result) => {
                assert_eq!(result.basic.unwrap().counts.class_count, "40");
            }
            PickOutcome::Stale => panic!("unexpected stale pick"),
        }
    }

    /// Source that blocks until the test releases it, so a second pick can
    /// overtake the first.
    struct GatedSource {
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl SchoolInfoSource for GatedSource {
        fn fetch_list(&self, _query: &crate::schoolinfo::ListQuery) -> FetchOutcome {
            if let Ok(rx) = self.gate.lock() {
                let _ = rx.recv();
            }
            FetchOutcome::Empty
        }
    }

    #[test]
    fn test_overtaken_pick_is_stale() {
        let (tx, rx) = std::sync::mpsc::channel();
        let picker = SchoolPicker::new(
            Some(Reconciler::new(GatedSource {
                gate: std::sync::Mutex::new(rx),
            })),
            EnergyDataset::default(),
            2025,
        );

        std::thread::scope(|scope| {
            let slow = scope.spawn(|| picker.pick(&record()));
            // wait until the slow pick holds its ticket
            while picker.sequencer().latest.load(Ordering::SeqCst) == 0 {
                std::thread::yield_now();
            }
            let _newer = picker.sequencer().issue();
            drop(tx);
            assert!(matches!(slow.join().unwrap(), PickOutcome::Stale));
        });
    }
}
