/// Retries `$send` up to `$max` times, stopping early on the first
/// non-NAK outcome. A bounded retry count, since the mesh's failure mode is
/// a NAK from the physical link rather than an invalidated send handle.
macro_rules! retry_on_nak {
    ($max:expr, $send:expr) => {{
        let mut attempt = 0u8;
        let mut result = $send;
        while attempt < $max {
            match result {
                Ok(crate::physical::WriteOutcome::Nak) => {
                    attempt += 1;
                    result = $send;
                }
                _ => break,
            }
        }
        result
    }};
}
