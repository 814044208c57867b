    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use chrono::TimeDelta;
    use tokio::sync::Notify;

    use crate::task::{Task, Work};

    fn job(period_ms: i64, max_run_time_ms: i64, delay_ms: i64, work: Work) -> Arc<Job> {
        let task = Task::create(
            "p",
            TimeDelta::milliseconds(period_ms),
            TimeDelta::milliseconds(max_run_time_ms),
            TimeDelta::milliseconds(delay_ms),
            work,
        )
        .unwrap();
        Arc::new(Job::new(task))
    }

    fn start(job: &Arc<Job>) -> tokio::task::JoinHandle<JobStatus> {
        start_with_grace(job, Duration::ZERO)
    }

    fn start_with_grace(job: &Arc<Job>, grace: Duration) -> tokio::task::JoinHandle<JobStatus> {
        let (token, run_id) = job.begin_run("p").unwrap();
        tokio::spawn(run(RunContext {
            name: "p".to_string(),
            job: job.clone(),
            pool: Weak::new(),
            token,
            run: run_id,
            grace,
        }))
    }

    /// Timer deadlines are rounded to the millisecond.
    fn assert_near(actual: Duration, expected: Duration) {
        let diff = actual.abs_diff(expected);
        assert!(diff <= Duration::from_millis(5), "{actual:?} != {expected:?}");
    }

    fn counting(counter: &Arc<AtomicUsize>) -> Work {
        let counter = counter.clone();
        Work::new(move |_token| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
    }

    /// Work that only returns once its token is cancelled.
    fn stubborn(saw_cancel: &Arc<AtomicBool>) -> Work {
        let saw_cancel = saw_cancel.clone();
        Work::new(move |token: CancellationToken| {
            let saw_cancel = saw_cancel.clone();
            async move {
                token.cancelled().await;
                saw_cancel.store(true, Ordering::SeqCst);
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_invokes_once_per_period() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = job(1000, 1000, 0, counting(&counter));
        let handle = start(&job);

        sleep(Duration::from_millis(3500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(job.status(), JobStatus::RunningDone);

        job.request("p", Signal::Stop).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
        assert_eq!(job.status(), JobStatus::Stopped);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_delay_never_invokes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = job(1000, 1000, 10_000, counting(&counter));
        let handle = start(&job);

        sleep(Duration::from_secs(1)).await;
        job.request("p", Signal::Stop).unwrap();

        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(job.snapshot().invocations, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_postpones_first_invocation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = job(1000, 1000, 2000, counting(&counter));
        let _handle = start(&job);

        sleep(Duration::from_millis(1900)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        job.request("p", Signal::Stop).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_cancels_invocation() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let job = job(5000, 2000, 0, stubborn(&saw_cancel));
        let started = Instant::now();
        let handle = start(&job);

        assert_eq!(handle.await.unwrap(), JobStatus::Expired);
        assert_near(started.elapsed(), Duration::from_secs(2));
        assert_eq!(job.status(), JobStatus::Expired);

        sleep(Duration::from_millis(1)).await;
        assert!(saw_cancel.load(Ordering::SeqCst));
        assert_eq!(job.snapshot().completions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_max_run_time_expires_slow_work() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let job = job(1000, 0, 0, stubborn(&saw_cancel));
        let handle = start(&job);

        assert_eq!(handle.await.unwrap(), JobStatus::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_in_flight_invocation() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let work = Work::new(move |_token| {
            let flag = flag.clone();
            async move {
                sleep(Duration::from_secs(3)).await;
                flag.store(true, Ordering::SeqCst);
            }
        });
        let job = job(1000, 10_000, 0, work);
        let started = Instant::now();
        let handle = start(&job);

        sleep(Duration::from_secs(1)).await;
        job.request("p", Signal::Stop).unwrap();
        assert_eq!(job.status(), JobStatus::RunningPending);
        assert_eq!(job.snapshot().pending, Some(Signal::Stop));

        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
        assert!(finished.load(Ordering::SeqCst));
        assert_near(started.elapsed(), Duration::from_secs(3));
        assert_eq!(job.snapshot().completions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_bounded_by_expiry() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let job = job(1000, 2000, 0, stubborn(&saw_cancel));
        let handle = start(&job);

        sleep(Duration::from_millis(500)).await;
        job.request("p", Signal::Stop).unwrap();

        assert_eq!(handle.await.unwrap(), JobStatus::Expired);
        sleep(Duration::from_millis(1)).await;
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_kill_cancels_in_flight_invocation() {
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let job = job(1000, 10_000, 0, stubborn(&saw_cancel));
        let started = Instant::now();
        let handle = start(&job);

        sleep(Duration::from_secs(1)).await;
        job.request("p", Signal::Kill).unwrap();
        assert_eq!(job.status(), JobStatus::Killed);

        assert_eq!(handle.await.unwrap(), JobStatus::Killed);
        assert_near(started.elapsed(), Duration::from_secs(1));
        sleep(Duration::from_millis(1)).await;
        assert!(saw_cancel.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_delays_release() {
        let counter = Arc::new(AtomicUsize::new(0));
        let job = job(1000, 1000, 0, counting(&counter));
        let handle = start_with_grace(&job, Duration::from_millis(500));

        sleep(Duration::from_millis(100)).await;
        job.request("p", Signal::Stop).unwrap();
        let stopped_at = Instant::now();

        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
        assert_near(stopped_at.elapsed(), Duration::from_millis(500));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_work_still_completes() {
        let work = Work::new(|_token| async {
            panic!("boom");
        });
        let job = job(1000, 1000, 0, work);
        let handle = start(&job);

        sleep(Duration::from_millis(1500)).await;
        let snapshot = job.snapshot();
        assert_eq!(snapshot.invocations, 2);
        assert_eq!(snapshot.completions, 2);
        assert_eq!(snapshot.status, JobStatus::RunningDone);

        job.request("p", Signal::Stop).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invocations_never_overlap() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (gauge, max) = (running.clone(), peak.clone());
        let work = Work::new(move |_token| {
            let (gauge, max) = (gauge.clone(), max.clone());
            async move {
                let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(1500)).await;
                gauge.fetch_sub(1, Ordering::SeqCst);
            }
        });
        let job = job(1000, 2000, 0, work);
        let handle = start(&job);

        // Overrunning invocations push the next start back instead of piling up.
        sleep(Duration::from_millis(2900)).await;
        assert_eq!(job.snapshot().invocations, 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);

        job.request("p", Signal::Stop).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_runs_back_to_back() {
        let reached = Arc::new(Notify::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let (notify, count) = (reached.clone(), counter.clone());
        let work = Work::new(move |_token| {
            let (notify, count) = (notify.clone(), count.clone());
            async move {
                if count.fetch_add(1, Ordering::SeqCst) + 1 == 5 {
                    notify.notify_one();
                }
            }
        });
        let job = job(0, 1000, 0, work);
        let started = Instant::now();
        let handle = start(&job);

        reached.notified().await;
        assert!(started.elapsed() < Duration::from_millis(100));

        job.request("p", Signal::Stop).unwrap();
        assert_eq!(handle.await.unwrap(), JobStatus::Stopped);
        assert!(counter.load(Ordering::SeqCst) >= 5);
    }
