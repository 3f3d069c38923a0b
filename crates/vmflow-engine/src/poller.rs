//! 完了待ちポーリング
//!
//! 状態の問い合わせ（[`Probe`]）、待機ループ（[`poll`]）、進捗表示
//! （[`PollObserver`]）を分離しています。ポーラー自身は進捗の表示方法を知りません。

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;
use vmflow_core::PollBounds;

/// 1回の問い合わせ結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult<T> {
    Pending,
    Ready(T),
    Failed(String),
}

/// ポーリングの最終結果
///
/// タイムアウトは失敗とは区別します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready {
        value: T,
        attempts: u32,
        elapsed: Duration,
    },
    Failed {
        reason: String,
        attempts: u32,
    },
    TimedOut {
        attempts: u32,
        elapsed: Duration,
    },
}

impl<T> PollOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Ready { attempts, .. }
            | PollOutcome::Failed { attempts, .. }
            | PollOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }

    pub fn value(self) -> Option<T> {
        match self {
            PollOutcome::Ready { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// ポーリング設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// 次の待機でこの時間を超える場合はタイムアウト
    pub deadline: Option<Duration>,
    /// 初回の問い合わせ前に待つ時間
    pub settle: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            deadline: None,
            settle: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = Some(settle);
        self
    }
}

impl From<&PollBounds> for PollPolicy {
    fn from(bounds: &PollBounds) -> Self {
        Self::new(bounds.interval, bounds.max_attempts)
    }
}

/// 状態の問い合わせ
#[async_trait]
pub trait Probe: Send {
    type Output: Send;

    /// 表示用の名前
    fn name(&self) -> &str;

    async fn check(&mut self) -> PollResult<Self::Output>;
}

/// 進捗イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent<'a> {
    /// 初回問い合わせ前の待機
    Settling { probe: &'a str, duration: Duration },
    /// 問い合わせ開始
    Attempt {
        probe: &'a str,
        attempt: u32,
        max_attempts: u32,
    },
    /// 未完了のため次の問い合わせまで待機
    Waiting {
        probe: &'a str,
        attempt: u32,
        next_in: Duration,
    },
    /// 固定待機の経過
    Elapsed { elapsed: Duration, total: Duration },
}

/// 進捗の受け取り手
pub trait PollObserver: Send {
    fn on_event(&mut self, event: PollEvent<'_>);
}

impl<F> PollObserver for F
where
    F: FnMut(PollEvent<'_>) + Send,
{
    fn on_event(&mut self, event: PollEvent<'_>) {
        self(event)
    }
}

/// 何もしないオブザーバー
pub struct SilentObserver;

impl PollObserver for SilentObserver {
    fn on_event(&mut self, _event: PollEvent<'_>) {}
}

/// `Ready` か `Failed` になるまで問い合わせを繰り返す
///
/// 待機は問い合わせの間にだけ行います。`max_attempts` 回問い合わせても
/// 完了しない場合、または次の待機で期限を超える場合は `TimedOut` を返します。
pub async fn poll<P: Probe>(
    probe: &mut P,
    policy: &PollPolicy,
    observer: &mut dyn PollObserver,
) -> PollOutcome<P::Output> {
    let start = Instant::now();
    let name = probe.name().to_string();

    if let Some(settle) = policy.settle {
        observer.on_event(PollEvent::Settling {
            probe: &name,
            duration: settle,
        });
        sleep(settle).await;
    }

    for attempt in 1..=policy.max_attempts {
        observer.on_event(PollEvent::Attempt {
            probe: &name,
            attempt,
            max_attempts: policy.max_attempts,
        });

        match probe.check().await {
            PollResult::Ready(value) => {
                debug!(probe = %name, attempt, "Probe ready");
                return PollOutcome::Ready {
                    value,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            }
            PollResult::Failed(reason) => {
                debug!(probe = %name, attempt, reason = %reason, "Probe failed");
                return PollOutcome::Failed {
                    reason,
                    attempts: attempt,
                };
            }
            PollResult::Pending => {}
        }

        // 最後の試行でなければ待機
        if attempt < policy.max_attempts {
            if let Some(deadline) = policy.deadline
                && start.elapsed() + policy.interval > deadline
            {
                return PollOutcome::TimedOut {
                    attempts: attempt,
                    elapsed: start.elapsed(),
                };
            }

            observer.on_event(PollEvent::Waiting {
                probe: &name,
                attempt,
                next_in: policy.interval,
            });
            sleep(policy.interval).await;
        }
    }

    debug!(probe = %name, attempts = policy.max_attempts, "Probe timed out");
    PollOutcome::TimedOut {
        attempts: policy.max_attempts,
        elapsed: start.elapsed(),
    }
}

/// 条件なしの固定待機
///
/// `step` ごとに経過を通知し、`total` 経過後に無条件で完了とします。
pub async fn wait_fixed(
    total: Duration,
    step: Duration,
    observer: &mut dyn PollObserver,
) -> PollOutcome<()> {
    let start = Instant::now();
    let step = if step.is_zero() { total } else { step };
    let mut waited = Duration::ZERO;
    let mut steps = 0;

    while waited < total {
        let chunk = step.min(total - waited);
        sleep(chunk).await;
        waited += chunk;
        steps += 1;
        observer.on_event(PollEvent::Elapsed {
            elapsed: waited,
            total,
        });
    }

    PollOutcome::Ready {
        value: (),
        attempts: steps,
        elapsed: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        remaining: u32,
        calls: u32,
    }

    #[async_trait]
    impl Probe for Countdown {
        type Output = u32;

        fn name(&self) -> &str {
            "countdown"
        }

        async fn check(&mut self) -> PollResult<u32> {
            self.calls += 1;
            if self.remaining == 0 {
                PollResult::Ready(self.calls)
            } else {
                self.remaining -= 1;
                PollResult::Pending
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_then_poll() {
        let mut probe = Countdown {
            remaining: 1,
            calls: 0,
        };
        let policy =
            PollPolicy::new(Duration::from_secs(30), 20).with_settle(Duration::from_secs(30));
        let mut events = Vec::new();
        let mut observer = |e: PollEvent<'_>| {
            events.push(format!("{:?}", e));
        };

        let outcome = poll(&mut probe, &policy, &mut observer).await;
        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: 2,
                attempts: 2,
                elapsed: Duration::from_secs(60),
            }
        );
        assert!(events[0].starts_with("Settling"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_short() {
        let mut probe = Countdown {
            remaining: u32::MAX,
            calls: 0,
        };
        let policy =
            PollPolicy::new(Duration::from_secs(10), 100).with_deadline(Duration::from_secs(25));

        let outcome = poll(&mut probe, &policy, &mut SilentObserver).await;
        assert_eq!(
            outcome,
            PollOutcome::TimedOut {
                attempts: 3,
                elapsed: Duration::from_secs(20),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_times_out_without_calling() {
        let mut probe = Countdown {
            remaining: 0,
            calls: 0,
        };
        let outcome = poll(
            &mut probe,
            &PollPolicy::new(Duration::from_secs(1), 0),
            &mut SilentObserver,
        )
        .await;
        assert_eq!(outcome.attempts(), 0);
        assert_eq!(probe.calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_fixed_reports_each_step() {
        let mut ticks = 0;
        let mut observer = |e: PollEvent<'_>| {
            if let PollEvent::Elapsed { .. } = e {
                ticks += 1;
            }
        };
        let outcome = wait_fixed(
            Duration::from_secs(600),
            Duration::from_secs(60),
            &mut observer,
        )
        .await;
        assert!(outcome.is_ready());
        assert_eq!(outcome.attempts(), 10);
        assert_eq!(ticks, 10);
    }
}
