// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub mod acquisition;
pub mod cancellation;
pub mod client;
pub mod distributed;
pub mod feature;
pub mod future;
pub mod guard;
pub mod heartbeat;
pub mod hygiene;
pub mod manager;
pub mod record;
pub mod store;
pub mod timeout;
pub mod wait_observer;

pub use acquisition::{LockWait, RetrySchedule};
pub use cancellation::{StopReason, StopToken, signal_stop_token};
pub use client::TargetLockClient;
pub use distributed::{DistributedLockingFeature, DistributedLockingSettings};
pub use feature::{LockFeature, OperResult};
pub use future::LockFuture;
pub use guard::ResourceLockGuard;
pub use heartbeat::{HeartbeatReport, HeartbeatScheduler, HeldLock, LockLossObserver};
pub use hygiene::{LockHygieneReport, LockHygieneRunner};
pub use manager::PolicyResourceLockManager;
pub use record::LockRow;
pub use store::LockStore;
pub use timeout::{
    LockTimeoutResolution, LockTimeoutResolver, LockTimeoutSource, LockTimeoutValue,
    parse_timeout_override,
};
pub use wait_observer::{LockWaitObserver, StderrWaitObserver};
