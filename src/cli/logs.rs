use anyhow::{Context, Result};

use super::args::GetLogsArgs;
use super::emit_table;
use crate::api::models::LogEntry;
use crate::context::AppContext;
use crate::core::fetcher::{FetchOptions, fetch_all_logs};
use crate::report::Table;
use crate::report::format::format_datetime;

pub async fn run(ctx: &mut AppContext, args: &GetLogsArgs) -> Result<()> {
    if args.job_id <= 0 {
        println!("Job id {} is invalid!", args.job_id);
        return Ok(());
    }

    let logs = if args.all_logs {
        let options = FetchOptions {
            batch_size: ctx.config.log_batch_size,
            timeout: None,
        };
        fetch_all_logs(&mut ctx.conn, args.job_id, options).await
    } else {
        ctx.conn.job_logs(args.job_id, args.start, args.count).await
    }
    .with_context(|| format!("Failed to get logs of job {}", args.job_id))?;

    println!("Logs for job {}", args.job_id);
    emit_table(&logs_table(&logs)?, &args.output).await;
    Ok(())
}

fn logs_table(logs: &[LogEntry]) -> Result<Table> {
    let mut table = Table::with_header(["Source IP", "Time", "Module", "Message Code", "Message"]);
    for log in logs {
        table.push_row([
            log.source_ip.clone(),
            format_datetime(log.time),
            log.module.clone(),
            log.message_code.clone(),
            log.message.clone(),
        ])?;
    }
    Ok(table)
}
