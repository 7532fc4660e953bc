use crate::error::DistLockError;

pub fn get_exit_code(error: &DistLockError) -> i32 {
    match error {
        DistLockError::InvalidArgument(_)
        | DistLockError::InvalidConfig(_)
        | DistLockError::ConfigError(_) => 2,

        DistLockError::LockNotHeld(_) => 3,

        DistLockError::Storage(_) | DistLockError::Sql(_) | DistLockError::FeatureStart { .. } => {
            20
        }

        DistLockError::LockingTimeout { .. } => 124,

        DistLockError::LockingCancelled { .. } => 130, // 128 + SIGINT

        _ => 1,
    }
}
