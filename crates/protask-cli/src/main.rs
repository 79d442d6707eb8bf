use std::process::ExitCode;

fn main() -> ExitCode {
    match protask_core::run(std::env::args_os().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("protask: {err:#}");
            ExitCode::FAILURE
        }
    }
}
