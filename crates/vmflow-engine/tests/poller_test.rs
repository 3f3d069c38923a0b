mod common;

use async_trait::async_trait;
use common::{FakeHypervisor, FakeShell, GUEST_IP};
use std::time::Duration;
use tokio::time::Instant;
use vmflow_engine::{
    CloudInitStatusProbe, GuestIpProbe, PollEvent, PollOutcome, PollPolicy, PollResult, Probe,
    SilentObserver, poll, wait_fixed,
};
use vmflow_hypervisor::CommandOutput;

/// 決められた順に結果を返すプローブ
struct ScriptedProbe {
    script: Vec<PollResult<&'static str>>,
    calls: usize,
}

impl ScriptedProbe {
    fn new(script: Vec<PollResult<&'static str>>) -> Self {
        Self { script, calls: 0 }
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    type Output = &'static str;

    fn name(&self) -> &str {
        "scripted"
    }

    async fn check(&mut self) -> PollResult<&'static str> {
        let result = self
            .script
            .get(self.calls)
            .cloned()
            .unwrap_or(PollResult::Pending);
        self.calls += 1;
        result
    }
}

fn pending_then(n: usize, last: PollResult<&'static str>) -> Vec<PollResult<&'static str>> {
    let mut script = vec![PollResult::Pending; n - 1];
    script.push(last);
    script
}

#[tokio::test(start_paused = true)]
async fn test_ready_after_exactly_n_calls() {
    let mut probe = ScriptedProbe::new(pending_then(5, PollResult::Ready("up")));
    let policy = PollPolicy::new(Duration::from_secs(2), 10);

    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert_eq!(probe.calls, 5);
    assert_eq!(outcome.attempts(), 5);
    assert_eq!(outcome.value(), Some("up"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_stops_immediately() {
    let mut script = pending_then(3, PollResult::Failed("boom".into()));
    script.push(PollResult::Ready("too late"));
    let mut probe = ScriptedProbe::new(script);

    let policy = PollPolicy::new(Duration::from_secs(1), 10);
    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert_eq!(probe.calls, 3);
    assert_eq!(
        outcome,
        PollOutcome::Failed {
            reason: "boom".into(),
            attempts: 3
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_always_pending_times_out_after_max_attempts() {
    let mut probe = ScriptedProbe::new(Vec::new());
    let start = Instant::now();

    let policy = PollPolicy::new(Duration::from_secs(5), 4);
    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert_eq!(probe.calls, 4);
    assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 4, .. }));
    // 待機は試行の間の3回だけ
    assert_eq!(start.elapsed(), Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cuts_polling_short() {
    let mut probe = ScriptedProbe::new(Vec::new());
    let policy =
        PollPolicy::new(Duration::from_secs(10), 100).with_deadline(Duration::from_secs(25));

    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert_eq!(probe.calls, 3);
    assert!(matches!(outcome, PollOutcome::TimedOut { attempts: 3, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_settle_precedes_first_attempt() {
    let mut probe = ScriptedProbe::new(vec![PollResult::Ready("ok")]);
    let policy = PollPolicy::new(Duration::from_secs(30), 5).with_settle(Duration::from_secs(30));
    let mut events = Vec::new();

    let outcome = poll(&mut probe, &policy, &mut |event: PollEvent<'_>| {
        events.push(format!("{event:?}"));
    })
    .await;

    let PollOutcome::Ready { elapsed, .. } = outcome else {
        panic!("expected ready");
    };
    assert_eq!(elapsed, Duration::from_secs(30));
    assert!(events[0].starts_with("Settling"));
    assert!(events[1].starts_with("Attempt"));
}

/// IPが4回目に得られる場合は約30秒で完了する
#[tokio::test(start_paused = true)]
async fn test_guest_ip_ready_on_fourth_call() {
    let hv = FakeHypervisor::new().with_guest_ips(&[None, None, None, Some(GUEST_IP)]);
    let mut probe = GuestIpProbe::new(&hv, "vm-1");
    let policy = PollPolicy::new(Duration::from_secs(10), 60);

    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    let PollOutcome::Ready {
        value,
        attempts,
        elapsed,
    } = outcome
    else {
        panic!("expected ready");
    };
    assert_eq!(value, GUEST_IP);
    assert_eq!(attempts, 4);
    assert_eq!(elapsed, Duration::from_secs(30));
    assert_eq!(hv.count("guest_ip"), 4);
}

#[tokio::test(start_paused = true)]
async fn test_unassigned_ip_is_pending() {
    let hv = FakeHypervisor::new().with_guest_ips(&[Some("0.0.0.0"), Some(GUEST_IP)]);
    let mut probe = GuestIpProbe::new(&hv, "vm-1");

    let policy = PollPolicy::new(Duration::from_secs(10), 5);
    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert_eq!(outcome.attempts(), 2);
    assert_eq!(outcome.value().as_deref(), Some(GUEST_IP));
}

/// running, running, error の順なら3回目で失敗
#[tokio::test(start_paused = true)]
async fn test_cloud_init_error_fails_on_third_call() {
    let shell = FakeShell::new().respond(
        "cloud-init status --long",
        vec![
            CommandOutput::ok("status: running\n"),
            CommandOutput::ok("status: running\n"),
            CommandOutput::failed(1, "status: error\ndetail: package install failed\n"),
        ],
    );
    let mut probe = CloudInitStatusProbe::new(&shell, "ubuntu@10.0.0.5");

    let policy = PollPolicy::new(Duration::from_secs(30), 20);
    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert_eq!(shell.count("cloud-init status --long"), 3);
    match outcome {
        PollOutcome::Failed { reason, attempts } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("package install failed"));
        }
        other => panic!("expected failed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cloud_init_unreachable_keeps_polling() {
    let shell = FakeShell::new().respond(
        "cloud-init status --long",
        vec![
            CommandOutput::failed(255, "ssh: connect to host 10.0.0.5 port 22: Connection refused"),
            CommandOutput::ok("status: done\n"),
        ],
    );
    let mut probe = CloudInitStatusProbe::new(&shell, "ubuntu@10.0.0.5");

    let policy = PollPolicy::new(Duration::from_secs(30), 20);
    let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;

    assert!(outcome.is_ready());
    assert_eq!(outcome.attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_fixed_reports_each_step() {
    let mut elapsed_events = Vec::new();
    let start = Instant::now();

    let outcome = wait_fixed(
        Duration::from_secs(150),
        Duration::from_secs(60),
        &mut |event: PollEvent<'_>| {
            if let PollEvent::Elapsed { elapsed, .. } = event {
                elapsed_events.push(elapsed.as_secs());
            }
        },
    )
    .await;

    assert!(outcome.is_ready());
    assert_eq!(elapsed_events, vec![60, 120, 150]);
    assert_eq!(start.elapsed(), Duration::from_secs(150));
}
