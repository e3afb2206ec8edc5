use eyre::eyre;
use regex::Regex;
use std::sync::LazyLock;

static BUCKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").unwrap());

static FIFO_QUEUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,75}\.fifo$").unwrap());

static FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

static SERVICE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,255}$").unwrap());

pub(crate) fn bucket_name(name: &str) -> eyre::Result<()> {
    if !BUCKET.is_match(name) || name.contains("..") {
        return Err(eyre!(
            "Invalid bucket name {name:?}: 3-63 lowercase letters, digits, dots and hyphens"
        ));
    }

    Ok(())
}

pub(crate) fn fifo_queue_name(name: &str) -> eyre::Result<()> {
    if !FIFO_QUEUE.is_match(name) {
        return Err(eyre!(
            "Invalid queue name {name:?}: up to 80 letters, digits, hyphens and underscores, ending with .fifo"
        ));
    }

    Ok(())
}

pub(crate) fn function_name(name: &str) -> eyre::Result<()> {
    if !FUNCTION.is_match(name) {
        return Err(eyre!(
            "Invalid function name {name:?}: up to 64 letters, digits, hyphens and underscores"
        ));
    }

    Ok(())
}

pub(crate) fn service_name(name: &str) -> eyre::Result<()> {
    if !SERVICE.is_match(name) {
        return Err(eyre!(
            "Invalid service name {name:?}: up to 255 letters, digits, hyphens and underscores"
        ));
    }

    Ok(())
}
