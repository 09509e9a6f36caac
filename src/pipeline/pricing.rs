//! Stage 2: trips in, fares out, on a bounded pool of workers.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, warn};

use crate::fare::FareCalculator;
use crate::models::{FareRecord, Trip};
use crate::transport::{Consumer, Publisher, TransportError, decode, encode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PricingReport {
    pub received: usize,
    pub rejected: usize,
    pub priced: usize,
    pub failed: usize,
}

impl PricingReport {
    fn record(&mut self, result: Result<Result<FareRecord, TransportError>, JoinError>) {
        match result {
            Ok(Ok(_)) => self.priced += 1,
            Ok(Err(e)) => {
                self.failed += 1;
                warn!(error = %e, "Failed to publish fare");
            }
            Err(e) => {
                self.failed += 1;
                error!(error = %e, "Pricing task failed");
            }
        }
    }
}

/// Prices every trip from `consumer` and publishes the fares.
///
/// At most `workers` trips are priced at once. A permit is taken before a
/// task is spawned, so a saturated pool stops the stage from pulling more
/// trips off the queue.
#[tracing::instrument(name = "pricing", skip(consumer, publisher, calculator))]
pub async fn run<C, P>(
    mut consumer: C,
    publisher: P,
    calculator: Arc<FareCalculator>,
    workers: usize,
) -> PricingReport
where
    C: Consumer,
    P: Publisher + 'static,
{
    let publisher = Arc::new(publisher);
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut report = PricingReport::default();

    while let Some(body) = consumer.consume().await {
        report.received += 1;
        let trip: Trip = match decode(&body) {
            Ok(trip) => trip,
            Err(e) => {
                report.rejected += 1;
                warn!(error = %e, "Dropping undecodable trip");
                continue;
            }
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let publisher = publisher.clone();
        let calculator = calculator.clone();
        let span = tracing::debug_span!("price_trip", trip_id = trip.id);

        tasks.spawn(
            async move {
                let _permit = permit;
                price_trip(&calculator, publisher.as_ref(), &trip).await
            }
            .instrument(span),
        );

        while let Some(result) = tasks.try_join_next() {
            report.record(result);
        }
    }

    while let Some(result) = tasks.join_next().await {
        report.record(result);
    }

    debug!(?report, "Pricing finished");
    report
}

async fn price_trip<P: Publisher>(
    calculator: &FareCalculator,
    publisher: &P,
    trip: &Trip,
) -> Result<FareRecord, TransportError> {
    let fare = calculator.calculate(trip);
    publisher.publish(encode(&fare)?).await?;
    debug!(trip_id = fare.id, fare = fare.fare, "Fare calculated and sent");
    Ok(fare)
}
