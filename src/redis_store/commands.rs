use std::time::Duration;

use crate::session_store::SetMode;

pub enum Command {
    Delete {
        key: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    Get {
        key: String,
    },
    Set {
        key: String,
        value: String,
        ttl: Duration,
        mode: SetMode,
    },
}

impl Command {
    pub fn delete(key: String) -> Self {
        Self::Delete { key }
    }
    pub fn expire(key: String, ttl: Duration) -> Self {
        Self::Expire { key, ttl }
    }
    pub fn get(key: String) -> Self {
        Self::Get { key }
    }
    pub fn set(key: String, value: String, ttl: Duration, mode: SetMode) -> Self {
        Self::Set {
            key,
            value,
            ttl,
            mode,
        }
    }
}

impl From<Command> for redis::Cmd {
    fn from(command: Command) -> Self {
        match command {
            Command::Delete { key } => redis::cmd("DEL").arg(&key).clone(),
            Command::Expire { key, ttl } => redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl.as_secs())
                .clone(),
            Command::Get { key } => redis::cmd("GET").arg(&key).clone(),
            Command::Set {
                key,
                value,
                ttl,
                mode,
            } => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&key).arg(&value);
                match mode {
                    SetMode::Always => {}
                    SetMode::IfAbsent => {
                        cmd.arg("NX");
                    }
                    SetMode::IfPresent => {
                        cmd.arg("XX");
                    }
                }
                cmd.arg("EX").arg(ttl.as_secs());
                cmd
            }
        }
    }
}
