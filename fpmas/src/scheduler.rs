//! Scheduler: composes tasks into jobs and jobs into epochs, per spec §4.K.
//!
//! A [`Task`] is anything with a `run()` effect. A [`Job`] is an ordered
//! pair of begin/end tasks plus a multiset of interior tasks and a stable
//! [`JobId`]. An [`Epoch`] is the ordered sequence of jobs due at one time
//! step, sub-step-ordered with submission order breaking ties. The
//! [`Scheduler`] maps a date to the epoch it must build, from recurrent
//! submissions of the form `(start_date, end_date?, period, job(s), sub_step)`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Error;

pub type TimeStep = u64;
pub type Period = u64;

/// Something with a `run()` effect. Interior mutability (`RefCell`, channels,
/// ...) is the caller's concern; the scheduler only ever calls `run()`. A
/// task that returns `Err` signals a fatal condition: the runtime aborts the
/// whole collective run rather than continuing to the next task (spec
/// §4.L/§7 — everything but `OutOfField`/`UnknownNode` is fatal).
pub trait Task {
    fn run(&mut self) -> Result<(), Error>;
}

/// Wraps a plain closure as a [`Task`], the common case for tests and small
/// models that don't need a named type per task.
pub struct FnTask<F: FnMut()> {
    f: F,
}

impl<F: FnMut()> FnTask<F> {
    pub fn new(f: F) -> Self {
        FnTask { f }
    }
}

impl<F: FnMut()> Task for FnTask<F> {
    fn run(&mut self) -> Result<(), Error> {
        (self.f)();
        Ok(())
    }
}

/// A shareable, named task handle. Jobs store `TaskHandle`s rather than
/// owning tasks outright so that the same task instance (e.g. a model's
/// per-agent behavior) can be scheduled into more than one job.
pub type TaskHandle = Rc<RefCell<dyn Task>>;

pub fn task(t: impl Task + 'static) -> TaskHandle {
    Rc::new(RefCell::new(t))
}

fn noop_task() -> TaskHandle {
    task(FnTask::new(|| {}))
}

/// Opaque, stable handle assigned at first `schedule`; stable across
/// rebuilds of the same job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

/// An ordered pair `(begin_task, end_task)` plus a multiset of interior
/// tasks and a stable id.
pub struct Job {
    id: JobId,
    begin: TaskHandle,
    end: TaskHandle,
    tasks: Vec<TaskHandle>,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Job {
            id,
            begin: noop_task(),
            end: noop_task(),
            tasks: Vec::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn set_begin_task(&mut self, t: TaskHandle) {
        self.begin = t;
    }

    pub fn set_end_task(&mut self, t: TaskHandle) {
        self.end = t;
    }

    pub fn add(&mut self, t: TaskHandle) {
        self.tasks.push(t);
    }

    pub fn begin_task(&self) -> &TaskHandle {
        &self.begin
    }

    pub fn end_task(&self) -> &TaskHandle {
        &self.end
    }

    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }
}

/// A single entry in a submitted recurrence: the job to run plus the
/// fractional position within the time step it runs at.
#[derive(Clone)]
struct Recurrence {
    start: TimeStep,
    end: Option<TimeStep>,
    period: Period,
    sub_step: f64,
    job: Rc<Job>,
    submission_index: u64,
}

impl Recurrence {
    fn covers(&self, date: TimeStep) -> bool {
        if date < self.start {
            return false;
        }
        if let Some(end) = self.end {
            if date >= end {
                return false;
            }
        }
        (date - self.start) % self.period.max(1) == 0
    }
}

/// An ordered sequence of `(sub_step, Job)` pairs due at one time step.
/// Iteration yields jobs in nondecreasing sub_step order, preserving
/// submission order for ties.
#[derive(Default)]
pub struct Epoch {
    entries: Vec<(f64, u64, Rc<Job>)>,
}

impl Epoch {
    pub fn new() -> Self {
        Epoch::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn submit(&mut self, sub_step: f64, submission_index: u64, job: Rc<Job>) {
        self.entries.push((sub_step, submission_index, job));
    }

    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap().then(a.1.cmp(&b.1)));
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().map(|(_, _, job)| job.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Maps a [`TimeStep`] to the [`Epoch`] it must build, derived from
/// recurrent submissions.
#[derive(Default)]
pub struct Scheduler {
    recurrences: Vec<Recurrence>,
    next_job_id: u64,
    next_submission: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler::default()
    }

    pub fn new_job_id(&mut self) -> JobId {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        id
    }

    /// Schedules `job` to run once at `date`, at `sub_step` (default 0.0 —
    /// see [`Scheduler::schedule_at`] for the common case).
    pub fn schedule(&mut self, date: TimeStep, job: Rc<Job>) {
        self.schedule_at(date, job, 0.0);
    }

    pub fn schedule_at(&mut self, date: TimeStep, job: Rc<Job>, sub_step: f64) {
        self.schedule_recurring_at(date, None, 1, job, sub_step);
    }

    pub fn schedule_recurring(&mut self, start: TimeStep, period: Period, job: Rc<Job>) {
        self.schedule_recurring_at(start, None, period, job, 0.0);
    }

    pub fn schedule_recurring_at(
        &mut self,
        start: TimeStep,
        end: Option<TimeStep>,
        period: Period,
        job: Rc<Job>,
        sub_step: f64,
    ) {
        debug_assert!(
            (0.0..1.0).contains(&sub_step),
            "sub_step must lie in [0, 1)"
        );
        let submission_index = self.next_submission;
        self.next_submission += 1;
        self.recurrences.push(Recurrence {
            start,
            end,
            period,
            sub_step,
            job,
            submission_index,
        });
    }

    pub fn schedule_until(&mut self, start: TimeStep, end: TimeStep, period: Period, job: Rc<Job>) {
        self.schedule_recurring_at(start, Some(end), period, job, 0.0);
    }

    /// Schedules every job in `jobs` under one recurrence entry each, all at
    /// the same `sub_step`, preserving their relative submission order.
    pub fn schedule_list_at(&mut self, date: TimeStep, jobs: Vec<Rc<Job>>, sub_step: f64) {
        for job in jobs {
            self.schedule_at(date, job, sub_step);
        }
    }

    /// Deterministically fills `epoch` with every job whose recurrence
    /// covers `date`, in nondecreasing `(sub_step, submission_index)`
    /// order. `epoch` is cleared first.
    pub fn build(&self, date: TimeStep, epoch: &mut Epoch) {
        epoch.clear();
        for recurrence in &self.recurrences {
            if recurrence.covers(date) {
                epoch.submit(recurrence.sub_step, recurrence.submission_index, recurrence.job.clone());
            }
        }
        epoch.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_job(scheduler: &mut Scheduler, log: Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Rc<Job> {
        let id = scheduler.new_job_id();
        let mut job = Job::new(id);
        job.add(task(FnTask::new(move || log.borrow_mut().push(name))));
        Rc::new(job)
    }

    #[test]
    fn schedule_order_matches_s6() {
        // S6: A@0.3, B@0.1, C@0.1 (A,B,C in that submission order), D@0.5,
        // all at date 0. Expected epoch order: [B, C, A, D].
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        let a = recording_job(&mut scheduler, log.clone(), "A");
        scheduler.schedule_at(0, a, 0.3);
        let b = recording_job(&mut scheduler, log.clone(), "B");
        scheduler.schedule_at(0, b, 0.1);
        let c = recording_job(&mut scheduler, log.clone(), "C");
        scheduler.schedule_at(0, c, 0.1);
        let d = recording_job(&mut scheduler, log.clone(), "D");
        scheduler.schedule_at(0, d, 0.5);

        let mut epoch = Epoch::new();
        scheduler.build(0, &mut epoch);
        for job in epoch.jobs() {
            for t in job.tasks() {
                t.borrow_mut().run().unwrap();
            }
        }
        assert_eq!(*log.borrow(), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn recurrence_respects_period_and_end() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.new_job_id();
        let job = Rc::new(Job::new(id));
        scheduler.schedule_until(2, 8, 3, job);

        let mut epoch = Epoch::new();
        for date in 0..10 {
            scheduler.build(date, &mut epoch);
            let hit = !epoch.is_empty();
            let expected = matches!(date, 2 | 5);
            assert_eq!(hit, expected, "date {date}");
        }
    }

    #[test]
    fn job_id_is_stable_across_rebuilds() {
        let mut scheduler = Scheduler::new();
        let id = scheduler.new_job_id();
        let job = Rc::new(Job::new(id));
        scheduler.schedule(0, job.clone());

        let mut epoch = Epoch::new();
        scheduler.build(0, &mut epoch);
        let first = epoch.jobs().next().unwrap().id();
        scheduler.build(0, &mut epoch);
        let second = epoch.jobs().next().unwrap().id();
        assert_eq!(first, second);
        assert_eq!(first, job.id());
    }
}
