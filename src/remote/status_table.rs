use tracing::debug;

use super::RemoteJob;

/// Parse the text printed by a server's status command.
///
/// Each job is one whitespace separated row: `<job id> <status> [pipeline]`.
/// Blank lines, separator rules made of `=` or `-`, and a header row whose
/// second column reads `status` are skipped.
pub fn parse_status_table(output: &str) -> Vec<RemoteJob> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_rule(line))
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let job_id = fields.next()?;
            let Some(status) = fields.next() else {
                debug!("Skipping status line without a status: {line:?}");
                return None;
            };
            if status.eq_ignore_ascii_case("status") {
                return None;
            }
            Some(RemoteJob {
                job_id_on_server: job_id.to_string(),
                status: status.to_string(),
                pipeline: fields.next().map(str::to_string),
            })
        })
        .collect()
}

fn is_rule(line: &str) -> bool {
    line.chars().all(|c| c == '=' || c == '-' || c.is_whitespace())
}
