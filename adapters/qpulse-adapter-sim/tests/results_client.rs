//! Results client behavior against the simulator backend.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

use qpulse_adapter_sim::SimulatorBackend;
use qpulse_hal::{
    Diagnostic, FetchedResult, HalError, HardwareConfig, Job, Machine, ResultValue,
};
use qpulse_ir::prelude::*;
use qpulse_ir::Program;

/// `I` averaged into `avg` (save_all), `n` saved as `count` (save) and `n` as `n` (save_all).
fn averaging_program() -> Program {
    let mut b = ProgramBuilder::new();
    let n = b.declare(ElementType::Int).unwrap();
    let i = b.declare(ElementType::Fixed).unwrap();
    let n_st = b.declare_stream();
    let i_st = b.declare_stream();
    {
        let mut body = b
            .for_(ForSpec::range(&n, 0, n.lt(100), &n + 1))
            .unwrap();
        body.measure("readout", "resonator", MeasureStream::None, [])
            .unwrap();
        body.save(&i, &i_st).unwrap();
        body.save(&n, &n_st).unwrap();
    }
    let mut sp = b.stream_processing().unwrap();
    i_st.average().save_all(&mut sp, "avg");
    n_st.save(&mut sp, "count");
    n_st.save_all(&mut sp, "n");
    drop(sp);
    b.finish().unwrap()
}

async fn start(sim: &Arc<SimulatorBackend>, program: &Program) -> Job {
    let machine = Machine::new(sim.clone(), HardwareConfig::empty());
    machine.execute(program).await.unwrap()
}

fn ints(values: impl IntoIterator<Item = i64>) -> Vec<ResultValue> {
    values.into_iter().map(ResultValue::Int).collect()
}

#[tokio::test(start_paused = true)]
async fn test_fetch_all_matches_count_after_done() {
    let sim = Arc::new(SimulatorBackend::new().with_chunk_size(3));
    let job = start(&sim, &averaging_program()).await;
    let averages = (0..10).map(|k| ResultValue::Float(f64::from(k) * 0.1));
    sim.push_values(job.id(), "avg", averages).unwrap();
    sim.finish(job.id()).unwrap();

    let results = job.result_handles().await.unwrap();
    let avg = results.require("avg").unwrap();
    assert!(avg.wait_for_all_values(Some(Duration::from_secs(1))).await.unwrap());

    let fetched = avg.fetch_all().await.unwrap();
    assert_eq!(fetched.len(), avg.count_so_far().await.unwrap());
    assert_eq!(fetched.len(), 10);
    assert!(!avg.is_processing().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_fetched_slice_is_prefix_of_later_fetch() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints(0..5)).unwrap();

    let results = job.result_handles().await.unwrap();
    let n = results.require("n").unwrap();
    assert_eq!(n.count_so_far().await.unwrap(), 5);
    let early = n.fetch(0_usize..3).await.unwrap().into_values();

    sim.push_values(job.id(), "n", ints(5..8)).unwrap();
    let late = n.fetch_all().await.unwrap().into_values();

    assert_eq!(early, ints(0..3));
    assert_eq!(&late[..early.len()], early.as_slice());
    assert_eq!(late.len(), 8);
    assert_eq!(n.fetch(4_usize).await.unwrap().into_values(), ints([4]));
    assert_eq!(n.fetch(5_usize..).await.unwrap().into_values(), ints(5..8));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_index_past_end_is_empty() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints(0..2)).unwrap();

    let results = job.result_handles().await.unwrap();
    let n = results.require("n").unwrap();
    assert!(n.fetch(usize::MAX).await.unwrap().into_values().is_empty());
    assert!(n.fetch(2_usize).await.unwrap().into_values().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_values_returns_at_deadline() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints([7])).unwrap();

    let results = job.result_handles().await.unwrap();
    let n = results.require("n").unwrap();
    n.wait_for_values(5, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(n.count_so_far().await.unwrap(), 1);
    assert!(n.is_processing().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_all_values_times_out() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;

    let results = job.result_handles().await.unwrap();
    let err = results
        .require("n")
        .unwrap()
        .wait_for_all_values(Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    match err {
        HalError::Timeout(message) => assert_eq!(message, "result n was not done in time"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_on_finished_job() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints(0..3)).unwrap();
    sim.finish(job.id()).unwrap();

    let results = job.result_handles().await.unwrap();
    let n = results.require("n").unwrap();
    assert!(n.wait_for_all_values(Some(Duration::ZERO)).await.unwrap());
    assert!(results.wait_for_all_values(Some(Duration::ZERO)).await.unwrap());
    n.wait_for_values(3, Some(Duration::ZERO)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_on_running_job() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;

    let results = job.result_handles().await.unwrap();
    let err = results
        .wait_for_all_values(Some(Duration::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::Timeout(_)));
}

#[tokio::test(start_paused = true)]
async fn test_halted_job_reports_not_done() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints(0..4)).unwrap();
    job.halt().await.unwrap();

    let results = job.result_handles().await.unwrap();
    assert!(!results.wait_for_all_values(Some(Duration::from_secs(5))).await.unwrap());
    assert!(!results.is_processing().await.unwrap());
    assert_eq!(
        results.require("n").unwrap().fetch_all().await.unwrap().len(),
        4
    );
}

#[tokio::test(start_paused = true)]
async fn test_single_result_returns_latest_value() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;

    let results = job.result_handles().await.unwrap();
    let count = results.require("count").unwrap();
    assert!(count.is_single());
    assert_eq!(count.fetch_all().await.unwrap(), FetchedResult::Single(None));

    sim.push_values(job.id(), "count", ints([1, 2, 3])).unwrap();
    assert_eq!(
        count.fetch_all().await.unwrap(),
        FetchedResult::Single(Some(ResultValue::Int(3)))
    );
    // Other indices are ignored.
    assert_eq!(
        count.fetch(5_usize).await.unwrap(),
        FetchedResult::Single(Some(ResultValue::Int(3)))
    );

    let err = count
        .wait_for_values(2, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, HalError::InvalidRequest(_)));
    assert!(matches!(
        count.fetcher().await,
        Err(HalError::InvalidRequest(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_fetcher_follows_until_done() {
    let sim = Arc::new(SimulatorBackend::new().with_chunk_size(2));
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints(0..3)).unwrap();

    let producer = {
        let sim = Arc::clone(&sim);
        let job_id = job.id().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            sim.push_values(&job_id, "n", ints(3..5)).unwrap();
            sim.finish(&job_id).unwrap();
        })
    };

    let results = job.result_handles().await.unwrap();
    let values: Vec<_> = results
        .require("n")
        .unwrap()
        .fetcher()
        .await
        .unwrap()
        .map(|v| v.unwrap())
        .collect()
        .await;
    producer.await.unwrap();

    assert_eq!(values, ints(0..5));
}

#[tokio::test(start_paused = true)]
async fn test_job_results_keep_schema_order() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;

    let results = job.result_handles().await.unwrap();
    let names: Vec<_> = results.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["avg", "count", "n"]);
    assert!(results.contains("avg"));
    assert!(results.get("I").is_none());
    assert!(matches!(
        results.require("I"),
        Err(HalError::ResultNotFound(_))
    ));

    // Loaded once per job.
    let again = job.result_handles().await.unwrap();
    assert!(std::ptr::eq(results, again));
}

#[tokio::test(start_paused = true)]
async fn test_dataloss_is_reported() {
    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &averaging_program()).await;
    sim.push_values(job.id(), "n", ints(0..2)).unwrap();
    sim.set_dataloss(job.id(), "n").unwrap();

    let results = job.result_handles().await.unwrap();
    let n = results.require("n").unwrap();
    assert!(n.has_dataloss().await.unwrap());
    assert_eq!(n.fetch_all().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let mut b = ProgramBuilder::new();
    b.play("x90", "qubit").unwrap();
    b.pause().unwrap();
    b.play("x90", "qubit").unwrap();
    let program = b.finish().unwrap();

    let sim = Arc::new(SimulatorBackend::new());
    let job = start(&sim, &program).await;
    assert!(job.is_paused().await.unwrap());
    job.resume().await.unwrap();
    assert!(!job.is_paused().await.unwrap());
    assert!(job.result_handles().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_execution_carries_all_messages() {
    let sim = Arc::new(SimulatorBackend::new().with_rejection(vec![
        Diagnostic::warning("pulse 'x90' is longer than its element's time of flight"),
        Diagnostic::error("element 'qubit' has no operation 'readout'"),
    ]));
    let machine = Machine::new(sim, HardwareConfig::empty());

    let err = machine.execute(&averaging_program()).await.unwrap_err();
    match err {
        HalError::ExecutionFailed { messages, .. } => assert_eq!(
            messages,
            "pulse 'x90' is longer than its element's time of flight\n\
             element 'qubit' has no operation 'readout'"
        ),
        other => panic!("expected execution failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dry_run_closes_results() {
    let sim = Arc::new(SimulatorBackend::new());
    let machine = Machine::new(sim, HardwareConfig::empty());
    let options = qpulse_hal::ExecuteOptions {
        dry_run: true,
        ..Default::default()
    };

    let job = machine
        .execute_with(&averaging_program(), &options)
        .await
        .unwrap();
    let results = job.result_handles().await.unwrap();
    assert!(!results.is_processing().await.unwrap());
    assert!(!results.wait_for_all_values(None).await.unwrap());
}
