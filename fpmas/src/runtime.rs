//! Drives the [`Scheduler`](crate::scheduler::Scheduler) over a date range,
//! per spec §4.L.
//!
//! Grounded directly on the original `fpmas::runtime::Runtime::run`: for
//! each date in `[start, end)`, build the epoch, then for every job in
//! sub-step order run its begin task, a shuffled permutation of its
//! interior tasks, then its end task. The original reseeds a fresh
//! `std::mt19937` on every call to `run`; we own one `SmallRng` per
//! `Runtime` instance instead, seeded once at construction from
//! `RuntimeConfig::seed`, so that two separate `run` calls on the same
//! instance don't repeat the same shuffle.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use fpmas_transport::{Rank, Tag, TagKind, Transport};

use crate::config::RuntimeConfig;
use crate::error::Error;
use crate::scheduler::{Epoch, Scheduler, TaskHandle, TimeStep};

/// Published at the start of each iteration so tasks can query it.
pub trait CurrentDate {
    fn current_date(&self) -> TimeStep;
}

/// Drives a [`Scheduler`] across a date range with a Runtime-owned PRNG.
pub struct Runtime {
    rng: SmallRng,
    date: TimeStep,
    epoch: Epoch,
}

impl Runtime {
    pub fn new(config: &RuntimeConfig) -> Self {
        Runtime {
            rng: SmallRng::seed_from_u64(config.seed),
            date: 0,
            epoch: Epoch::new(),
        }
    }

    pub fn current_date(&self) -> TimeStep {
        self.date
    }

    /// Equivalent to `run(0, end)`.
    pub fn run<T: Transport>(
        &mut self,
        scheduler: &Scheduler,
        end: TimeStep,
        transport: &T,
    ) -> Result<(), Error> {
        self.run_from(scheduler, 0, end, transport)
    }

    /// Runs every date in `[start, end)`. A task that signals a fatal error
    /// aborts the whole run immediately (no mid-epoch cancellation, per spec
    /// §4.L): this process raises its color BLACK and broadcasts an Abort
    /// tag to every peer rank, on both epoch parities since we don't know
    /// which parity a given peer is currently blocked on, so any peer stuck
    /// in a `recv` (termination ring, mutex wait, ...) unblocks and aborts
    /// too instead of waiting forever (spec §7).
    pub fn run_from<T: Transport>(
        &mut self,
        scheduler: &Scheduler,
        start: TimeStep,
        end: TimeStep,
        transport: &T,
    ) -> Result<(), Error> {
        for date in start..end {
            self.date = date;
            scheduler.build(date, &mut self.epoch);
            for job in self.epoch.jobs() {
                if let Err(err) = job.begin_task().borrow_mut().run() {
                    return self.abort_on_fatal(transport, err);
                }

                let mut shuffled: Vec<TaskHandle> = job.tasks().to_vec();
                shuffled.shuffle(&mut self.rng);
                for t in &shuffled {
                    if let Err(err) = t.borrow_mut().run() {
                        return self.abort_on_fatal(transport, err);
                    }
                }

                if let Err(err) = job.end_task().borrow_mut().run() {
                    return self.abort_on_fatal(transport, err);
                }
            }
        }
        Ok(())
    }

    /// Drives the collective BLACK+END abort sequence for a fatal task
    /// error, then returns it. A non-fatal error (OutOfField/UnknownNode)
    /// is returned directly without broadcasting, since those are surfaced
    /// to the caller rather than aborting the run.
    fn abort_on_fatal<T: Transport>(&self, transport: &T, err: Error) -> Result<(), Error> {
        if err.is_fatal() {
            let my_rank = transport.rank();
            let size = transport.size() as Rank;
            for dest in 0..size {
                if dest == my_rank {
                    continue;
                }
                for epoch in [false, true] {
                    let _ = transport.send((), dest, Tag::new(TagKind::Abort, epoch));
                }
            }
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{task, FnTask, Job};
    use fpmas_transport::ProcessTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn single_transport() -> impl Transport {
        ProcessTransport::new_cluster(1).into_iter().next().unwrap()
    }

    #[test]
    fn single_process_single_node_increment() {
        // S1 (sans the graph): one task incrementing shared state once per
        // date across a one-date run.
        let counter = Rc::new(RefCell::new(0));
        let mut scheduler = Scheduler::new();
        let id = scheduler.new_job_id();
        let mut job = Job::new(id);
        let c = counter.clone();
        job.add(task(FnTask::new(move || *c.borrow_mut() += 1)));
        scheduler.schedule(0, Rc::new(job));

        let config = RuntimeConfig::default();
        let mut runtime = Runtime::new(&config);
        let transport = single_transport();
        runtime.run(&scheduler, 1, &transport).unwrap();
        assert_eq!(*counter.borrow(), 1);
    }

    #[test]
    fn current_date_is_published_before_each_iteration() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for date in 0..3u64 {
            let id = scheduler.new_job_id();
            let mut job = Job::new(id);
            let seen = seen.clone();
            job.add(task(FnTask::new(move || seen.borrow_mut().push(date))));
            scheduler.schedule(date, Rc::new(job));
        }
        let config = RuntimeConfig::default();
        let mut runtime = Runtime::new(&config);
        let transport = single_transport();
        runtime.run(&scheduler, 3, &transport).unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn shuffle_is_deterministic_given_the_seed() {
        let build = |seed| {
            let order = Rc::new(RefCell::new(Vec::new()));
            let mut scheduler = Scheduler::new();
            let id = scheduler.new_job_id();
            let mut job = Job::new(id);
            for i in 0..20 {
                let order = order.clone();
                job.add(task(FnTask::new(move || order.borrow_mut().push(i))));
            }
            scheduler.schedule(0, Rc::new(job));
            let config = RuntimeConfig {
                seed,
                ..RuntimeConfig::default()
            };
            let mut runtime = Runtime::new(&config);
            let transport = single_transport();
            runtime.run(&scheduler, 1, &transport).unwrap();
            order.borrow().clone()
        };
        assert_eq!(build(42), build(42));
    }

    #[test]
    fn fatal_task_error_broadcasts_abort_to_every_peer() {
        let cluster = ProcessTransport::new_cluster(2);
        std::thread::scope(|scope| {
            let mut transports: Vec<_> = cluster.into_iter().collect();
            let t1 = transports.pop().unwrap();
            let t0 = transports.pop().unwrap();

            let failing = scope.spawn(move || {
                let mut scheduler = Scheduler::new();
                let id = scheduler.new_job_id();
                let mut job = Job::new(id);
                job.add(task(FnTask2::new(|| {
                    Err(Error::StateViolation("boom".into()))
                })));
                scheduler.schedule(0, Rc::new(job));
                let config = RuntimeConfig::default();
                let mut runtime = Runtime::new(&config);
                runtime.run(&scheduler, 1, &t0)
            });

            let watcher = scope.spawn(move || {
                use fpmas_transport::{Tag, TagKind};
                let abort_tag = Tag::new(TagKind::Abort, false);
                let alt_tag = Tag::new(TagKind::Abort, true);
                loop {
                    if t1.probe(None, Some(abort_tag)).unwrap().is_some() {
                        let _ = t1.recv::<()>(None, Some(abort_tag)).unwrap();
                        return;
                    }
                    if t1.probe(None, Some(alt_tag)).unwrap().is_some() {
                        let _ = t1.recv::<()>(None, Some(alt_tag)).unwrap();
                        return;
                    }
                }
            });

            assert!(failing.join().unwrap().is_err());
            watcher.join().unwrap();
        });
    }

    /// A `Task` built from a closure returning `Result<(), Error>`, for the
    /// one test above that needs to signal a fatal error; `FnTask` itself
    /// always succeeds.
    struct FnTask2<F: FnMut() -> Result<(), Error>> {
        f: F,
    }

    impl<F: FnMut() -> Result<(), Error>> FnTask2<F> {
        fn new(f: F) -> Self {
            FnTask2 { f }
        }
    }

    impl<F: FnMut() -> Result<(), Error>> crate::scheduler::Task for FnTask2<F> {
        fn run(&mut self) -> Result<(), Error> {
            (self.f)()
        }
    }
}
