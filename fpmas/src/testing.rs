//! In-process multi-rank test harness, per SPEC_FULL.md's test-tooling
//! section — standing in for spinning up a real MPI job under a test
//! runner: every rank is a plain OS thread sharing [`ProcessTransport`]'s
//! `crossbeam-channel` wiring, scoped so none can outlive the harness call.
//!
//! This is where scenario tests (S2 onward, any scenario needing more than
//! one rank) get their cluster from, rather than hand-rolling
//! `ProcessTransport::new_cluster` plus `std::thread::scope` at every call
//! site.

use fpmas_transport::ProcessTransport;

/// Runs `body` once per rank of a `size`-rank in-process cluster, each on
/// its own thread, and blocks until every rank finishes. A panicking rank's
/// assertion failure is re-raised on the calling thread rather than
/// silently swallowed, so a single rank's failure still fails the test.
pub fn run_cluster<F>(size: usize, body: F)
where
    F: Fn(ProcessTransport) + Sync,
{
    run_cluster_indexed(size, |_rank, transport| body(transport));
}

/// Like [`run_cluster`], but `body` also receives the rank index — useful
/// when each rank's behavior differs (most scenarios: rank 0 builds, the
/// rest just distribute/synchronize).
pub fn run_cluster_indexed<F>(size: usize, body: F)
where
    F: Fn(usize, ProcessTransport) + Sync,
{
    let cluster = ProcessTransport::new_cluster(size);
    let results: Vec<std::thread::Result<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = cluster
            .into_iter()
            .enumerate()
            .map(|(rank, transport)| scope.spawn(|| body(rank, transport)))
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    for result in results {
        if let Err(panic) = result {
            std::panic::resume_unwind(panic);
        }
    }
}
