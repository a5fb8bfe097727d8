//! Lua sources for the shared-store algorithms.
//!
//! Every script takes `KEYS[1]` as the limiter key and returns 1 to admit or
//! 0 to reject. Time comes from the store's `TIME`.

pub(super) const FIXED_WINDOW: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_size = tonumber(ARGV[2])
local permits = tonumber(ARGV[3])

local now = tonumber(redis.call('TIME')[1])
local window_start = math.floor(now / window_size) * window_size

local count = 0
local stored_start = window_start
local stored = redis.call('GET', key)
if stored then
    local sep = string.find(stored, ':', 1, true)
    if sep then
        count = tonumber(string.sub(stored, 1, sep - 1)) or 0
        stored_start = tonumber(string.sub(stored, sep + 1)) or window_start
    end
end

if window_start > stored_start then
    count = 0
    stored_start = window_start
end

if count + permits <= limit then
    redis.call('SET', key, (count + permits) .. ':' .. stored_start)
    return 1
end
return 0
"#;

pub(super) const TOKEN_BUCKET: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_amount = tonumber(ARGV[2])
local refill_interval = tonumber(ARGV[3])
local permits = tonumber(ARGV[4])

local key_type = redis.call('TYPE', key)['ok']
if key_type ~= 'hash' and key_type ~= 'none' then
    redis.log(redis.LOG_WARNING, 'rategate: resetting ' .. key .. ' of type ' .. key_type)
    redis.call('DEL', key)
end

local now = tonumber(redis.call('TIME')[1])
local state = redis.call('HMGET', key, 'tokens', 'last_refill_time')
local tokens = tonumber(state[1])
local last_refill_time = tonumber(state[2])
if tokens == nil or last_refill_time == nil then
    tokens = capacity
    last_refill_time = now
end

local elapsed = math.max(0, now - last_refill_time)
local intervals = math.floor(elapsed / refill_interval)
tokens = math.max(0, math.min(capacity, tokens + intervals * refill_amount))
last_refill_time = math.max(last_refill_time, now)

local admitted = 0
if tokens >= permits then
    tokens = tokens - permits
    admitted = 1
end

redis.call('HMSET', key, 'tokens', tokens, 'last_refill_time', last_refill_time)
return admitted
"#;

pub(super) const LEAKY_BUCKET: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local leak_rate = tonumber(ARGV[2])
local permits = tonumber(ARGV[3])

local key_type = redis.call('TYPE', key)['ok']
if key_type ~= 'hash' and key_type ~= 'none' then
    redis.log(redis.LOG_WARNING, 'rategate: resetting ' .. key .. ' of type ' .. key_type)
    redis.call('DEL', key)
end

local now = tonumber(redis.call('TIME')[1])
local state = redis.call('HMGET', key, 'current_size', 'last_process_time')
local current_size = tonumber(state[1])
local last_process_time = tonumber(state[2])
if current_size == nil or last_process_time == nil then
    current_size = 0
    last_process_time = now
end

local elapsed = math.max(0, now - last_process_time)
local leaked = math.floor(elapsed * leak_rate)
current_size = math.max(0, current_size - leaked)
last_process_time = math.max(last_process_time, now)

local admitted = 0
if current_size + permits <= capacity then
    current_size = current_size + permits
    admitted = 1
end

redis.call('HMSET', key, 'current_size', current_size, 'last_process_time', last_process_time)
return admitted
"#;

pub(super) const SLIDING_LOG: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_size = tonumber(ARGV[2])
local permits = tonumber(ARGV[3])

local time = redis.call('TIME')
local now = tonumber(time[1])
local oldest = now - window_size

redis.call('ZREMRANGEBYSCORE', key, '-inf', '(' .. oldest)
local entries = redis.call('ZRANGEBYSCORE', key, oldest, now)
local count = #entries

local admitted = 0
if count + permits <= limit then
    for i = 1, permits do
        local nonce = time[2] .. '-' .. i .. '-' .. math.random(1000000)
        redis.call('ZADD', key, now, now .. ':' .. nonce)
    end
    admitted = 1
end

redis.call('EXPIRE', key, window_size * 2)
return admitted
"#;

pub(super) const SLIDING_COUNTER: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_size = tonumber(ARGV[2])
local sub_windows = tonumber(ARGV[3])
local permits = tonumber(ARGV[4])

local now = tonumber(redis.call('TIME')[1])
local current = math.floor(now * sub_windows / window_size)

local total = 0
for i = 0, sub_windows - 1 do
    total = total + (tonumber(redis.call('GET', key .. ':' .. (current - i))) or 0)
end

if total + permits <= limit then
    local current_key = key .. ':' .. current
    redis.call('INCRBY', current_key, permits)
    redis.call('EXPIRE', current_key, window_size + 10)
    return 1
end
return 0
"#;
