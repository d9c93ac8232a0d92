use crate::commands::{open_migrated_pool, CommandOptions, CommandResult, StepFailure};

pub fn run(options: &CommandOptions) -> CommandResult {
    let (config, runtime) = match options.prepare("migrate") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let outcome = runtime.block_on(async {
        let pool = open_migrated_pool(&config.database).await?;
        pool.close().await;
        Ok::<_, StepFailure>("source schema is up to date".to_owned())
    });
    CommandResult::from_step("migrate", outcome)
}
