//! Lua scripts run atomically inside Redis so acquire/extend/release are
//! each a single round trip with no check-then-act race.

/// `KEYS[1]` = lock key, `ARGV[1]` = owner token, `ARGV[2]` = TTL millis.
/// Returns 1 if acquired, 0 if already held by someone else.
pub const LOCK_ACQUIRE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
    redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return 1
else
    return 0
end
";

/// `KEYS[1]` = lock key, `ARGV[1]` = owner token, `ARGV[2]` = new TTL millis.
/// Returns 1 if extended (owner matched), 0 otherwise.
pub const LOCK_EXTEND: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('PEXPIRE', KEYS[1], ARGV[2])
    return 1
else
    return 0
end
";

/// `KEYS[1]` = lock key, `ARGV[1]` = owner token.
/// Returns 1 if deleted (owner matched), 0 otherwise.
pub const LOCK_RELEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('DEL', KEYS[1])
    return 1
else
    return 0
end
";
