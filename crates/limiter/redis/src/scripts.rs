/// Lua script for atomic token-bucket refill-and-consume.
///
/// KEYS\[1\] = the bucket key
/// ARGV\[1\] = current time in milliseconds
/// ARGV\[2\] = bucket capacity in tokens
/// ARGV\[3\] = refill rate in tokens per millisecond
/// ARGV\[4\] = state TTL in milliseconds (the limit window)
///
/// State is packed as `<tokens>:<last_refill_ms>` in one value. A missing
/// key is a first touch: the bucket starts at capacity and the call
/// consumes one token, so the first call is always allowed.
///
/// Returns a two-element array `{allowed, remaining}` where `allowed` is
/// 1 or 0 and `remaining` is the token count scaled by 1e6 (Lua numbers
/// come back to the client truncated to integers).
pub const TOKEN_BUCKET: &str = r"
local now_ms = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local rate_per_ms = tonumber(ARGV[3])
local window_ms = tonumber(ARGV[4])

local tokens = capacity
local state = redis.call('GET', KEYS[1])
if state then
    local sep = string.find(state, ':', 1, true)
    local stored = tonumber(string.sub(state, 1, sep - 1))
    local last_ms = tonumber(string.sub(state, sep + 1))
    local elapsed = now_ms - last_ms
    if elapsed < 0 then
        elapsed = 0
    end
    tokens = stored + elapsed * rate_per_ms
    if tokens > capacity then
        tokens = capacity
    end
end

local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end

redis.call('SET', KEYS[1], tokens .. ':' .. now_ms)
redis.call('PEXPIRE', KEYS[1], window_ms)
return {allowed, math.floor(tokens * 1000000)}
";
