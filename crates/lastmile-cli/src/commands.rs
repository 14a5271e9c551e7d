//! Command handlers for the CLI.
//!
//! These run after the engine is restored from the session snapshot; `main`
//! saves the snapshot back once the handler returns. Handlers print for
//! the driver and return errors for anything that should stop the command.

use uuid::Uuid;

use lastmile_core::{CaptureResult, CapturedAddress, Coordinates, OriginPoint, Stop, UnitDetails};
use lastmile_engine::{DeliveryEngine, DeliveryProgress, StopOutcome};

pub(crate) struct CaptureArgs {
    pub address: String,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub floor: Option<String>,
    pub apartment: Option<String>,
    pub packages: u32,
}

/// Capture a stop, merging into an existing one if the exact unit was
/// already captured.
pub(crate) fn run_capture(engine: &mut DeliveryEngine, args: CaptureArgs) {
    let unit = UnitDetails {
        floor: args.floor,
        apartment: args.apartment,
    };
    let result = engine.capture(CapturedAddress {
        raw_address_text: args.address,
        locality: args.locality,
        region: args.region,
        postal_code: args.postal_code,
        country: args.country,
        coordinates: args.lat.zip(args.lng).map(|(latitude, longitude)| Coordinates {
            latitude,
            longitude,
        }),
        unit: (!unit.is_empty()).then_some(unit),
        package_count: args.packages,
    });
    match result {
        CaptureResult::Created(id) => println!("captured stop {id}"),
        CaptureResult::Merged {
            into,
            package_count,
        } => println!("merged into stop {into} ({package_count} packages total)"),
    }
}

/// Submit captured stops for normalization and report the reconciliation.
///
/// # Errors
///
/// Returns an error if nothing is awaiting submission or the authority
/// call fails; in either case no stop changed state.
pub(crate) async fn run_submit(engine: &mut DeliveryEngine) -> anyhow::Result<()> {
    let outcome = engine.submit_for_normalization().await?;
    println!(
        "normalized {} stop(s), synthesized {}",
        outcome.normalized.len(),
        outcome.synthesized.len()
    );
    for error in &outcome.rejected {
        eprintln!("rejected: {error}");
    }
    if !outcome.rejected.is_empty() {
        eprintln!("correct the captures above and run `submit` again");
    }
    Ok(())
}

/// Compute the route over the normalized stops.
///
/// # Errors
///
/// Returns an error if no stop is normalized, a run is already active, or
/// the authority call fails.
pub(crate) async fn run_route(
    engine: &mut DeliveryEngine,
    origin_lat: f64,
    origin_lng: f64,
) -> anyhow::Result<()> {
    let outcome = engine
        .compute_route(OriginPoint::new(origin_lat, origin_lng))
        .await?;
    println!(
        "route {}: {} stop(s), {:.1} km, ~{} min",
        outcome.route_id,
        outcome.sequenced.len(),
        outcome.distance_meters as f64 / 1000.0,
        outcome.duration_seconds / 60
    );
    for record in &outcome.unmatched {
        eprintln!(
            "warning: route point {} did not match any stop",
            record
                .geo_key
                .as_deref()
                .unwrap_or("<no key>")
        );
    }
    Ok(())
}

/// Start the run and activate the first stop of the walk.
///
/// # Errors
///
/// Returns an error if no route is computed, a run is already active, or
/// the authority call fails.
pub(crate) async fn run_start(engine: &mut DeliveryEngine, driver_id: i64) -> anyhow::Result<()> {
    let outcome = engine.start_route(driver_id).await?;
    println!("run {} started with {} stop(s)", outcome.run_id, outcome.stop_count);
    for id in &outcome.synthesized {
        if let Some(stop) = engine.store().get(*id) {
            eprintln!(
                "warning: authority expects a delivery never captured here, added as: {}",
                describe(stop)
            );
        }
    }
    if let Some(stop) = engine.current_stop() {
        println!("first stop: {}", describe(stop));
    }
    Ok(())
}

/// Print every stop with its status, in capture order, plus the walk
/// position when a run is active.
pub(crate) fn run_status(engine: &DeliveryEngine) {
    if engine.store().is_empty() {
        println!("no stops captured; run `capture` first");
        return;
    }
    let header = format!("{:<38}{:<7}{:<11}{:<5}ADDRESS", "ID", "ORDER", "STATUS", "PKG");
    println!("{header}");
    for stop in engine.store().iter() {
        let order = stop.order.map_or_else(|| "\u{2014}".to_string(), |o| o.to_string());
        println!(
            "{:<38}{:<7}{:<11}{:<5}{}",
            stop.local_id, order, stop.status, stop.package_count, stop.raw_address_text
        );
    }
    if let Some(current) = engine.current_stop() {
        println!();
        println!("current stop: {}", describe(current));
    } else if engine.is_finished() {
        println!();
        println!("run finished; see `summary`");
    }
}

/// Inspect one stop of the active run.
///
/// # Errors
///
/// Returns an error if no run is active or the stop is not part of it.
pub(crate) fn run_show(engine: &DeliveryEngine, stop_id: Uuid) -> anyhow::Result<()> {
    let stop = engine.jump_to(stop_id)?;
    println!("{}", describe(stop));
    if let Some(unit) = &stop.unit {
        let floor = unit.floor.as_deref().unwrap_or("\u{2014}");
        let apartment = unit.apartment.as_deref().unwrap_or("\u{2014}");
        println!("floor {floor}, apartment {apartment}");
    }
    if let Some(note) = &stop.outcome_note {
        println!("note: {note}");
    }
    Ok(())
}

/// Record the outcome of the current stop and report where the walk moved.
///
/// # Errors
///
/// Returns an error if no run is active, no stop is pending, or the
/// authority does not acknowledge the outcome. On a transport failure the
/// stop stays pending and the command can be re-run as is.
pub(crate) async fn run_deliver(
    engine: &mut DeliveryEngine,
    failed: bool,
    note: Option<String>,
    at: Option<(f64, f64)>,
) -> anyhow::Result<()> {
    let outcome = StopOutcome {
        success: !failed,
        note,
    };
    match engine.record_outcome(outcome, at).await? {
        DeliveryProgress::Advanced(_) => {
            if let Some(stop) = engine.current_stop() {
                println!("next stop: {}", describe(stop));
            }
        }
        DeliveryProgress::Finished => {
            println!("all stops decided; run `summary` for the wrap-up");
        }
    }
    Ok(())
}

/// Re-admit the first failed stop for another attempt.
///
/// # Errors
///
/// Returns an error if a stop is still pending or nothing failed.
pub(crate) fn run_retry(engine: &mut DeliveryEngine) -> anyhow::Result<()> {
    let readmitted = engine.retry_failed()?;
    if let Some(stop) = engine.store().get(readmitted) {
        println!("retrying: {}", describe(stop));
    }
    Ok(())
}

/// Print the completion summary of the finished run.
///
/// # Errors
///
/// Returns an error if no run is active or stops remain undecided.
pub(crate) fn run_summary(engine: &DeliveryEngine) -> anyhow::Result<()> {
    let summary = engine.summary()?;
    println!(
        "run {}: {} delivered, {} failed of {} stop(s)",
        summary.run_id,
        summary.completed.len(),
        summary.failed.len(),
        summary.total()
    );
    if !summary.failed.is_empty() {
        println!();
        println!("failed stops:");
        for stop in &summary.failed {
            let note = stop.outcome_note.as_deref().unwrap_or("\u{2014}");
            println!("  {} ({note})", stop.raw_address_text);
        }
    }
    Ok(())
}

/// Close the finished run: print the completion summary, then archive the
/// run so the session can capture and route again.
///
/// # Errors
///
/// Returns an error if no run is active or stops remain undecided.
pub(crate) fn run_close(engine: &mut DeliveryEngine) -> anyhow::Result<()> {
    let summary = engine.close_run()?;
    println!(
        "run {} closed: {} delivered, {} failed of {} stop(s)",
        summary.run_id,
        summary.completed.len(),
        summary.failed.len(),
        summary.total()
    );
    println!("ready for a new route");
    Ok(())
}

/// One-line description of a stop for the driver.
fn describe(stop: &Stop) -> String {
    let order = stop
        .order
        .map(|o| format!("#{o} "))
        .unwrap_or_default();
    format!(
        "{order}{} ({} package(s), {})",
        stop.raw_address_text, stop.package_count, stop.status
    )
}
