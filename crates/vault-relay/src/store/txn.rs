use std::time::Duration;

/// Precondition checked atomically with the ops of a [`Txn`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guard {
    IsMember { key: String, member: String },
    NotMember { key: String, member: String },
    KeyAbsent { key: String },
}

impl Guard {
    pub fn is_member(key: impl Into<String>, member: impl Into<String>) -> Self {
        Guard::IsMember { key: key.into(), member: member.into() }
    }

    pub fn not_member(key: impl Into<String>, member: impl Into<String>) -> Self {
        Guard::NotMember { key: key.into(), member: member.into() }
    }

    pub fn key_absent(key: impl Into<String>) -> Self {
        Guard::KeyAbsent { key: key.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    /// Adds every member; the number of members not already present is
    /// added to the `count_into` counter.
    SAddAll { key: String, members: Vec<String>, count_into: Option<String> },
    HSet { key: String, field: String, value: String },
    HDel { key: String, field: String },
    HIncrBy { key: String, field: String, delta: i64 },
    Set { key: String, value: String, ttl: Option<Duration> },
    Del { key: String },
    IncrBy { key: String, delta: i64 },
    /// Stores `value` only if it is greater than the current value.
    SetMax { key: String, value: u64 },
}

impl Op {
    pub fn sadd(key: impl Into<String>, member: impl Into<String>) -> Self {
        Op::SAdd { key: key.into(), member: member.into() }
    }

    pub fn srem(key: impl Into<String>, member: impl Into<String>) -> Self {
        Op::SRem { key: key.into(), member: member.into() }
    }

    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        Op::HSet { key: key.into(), field: field.into(), value: value.into() }
    }

    pub fn hdel(key: impl Into<String>, field: impl Into<String>) -> Self {
        Op::HDel { key: key.into(), field: field.into() }
    }

    pub fn hincr_by(key: impl Into<String>, field: impl Into<String>, delta: i64) -> Self {
        Op::HIncrBy { key: key.into(), field: field.into(), delta }
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Op::Set { key: key.into(), value: value.into(), ttl }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Op::Del { key: key.into() }
    }

    pub fn incr_by(key: impl Into<String>, delta: i64) -> Self {
        Op::IncrBy { key: key.into(), delta }
    }

    pub fn set_max(key: impl Into<String>, value: u64) -> Self {
        Op::SetMax { key: key.into(), value }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Txn {
    pub guards: Vec<Guard>,
    pub ops: Vec<Op>,
}

impl Txn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed,
    /// Index into `Txn::guards` of the first guard that did not hold.
    GuardFailed(usize),
}

impl TxnOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TxnOutcome::Committed)
    }
}
