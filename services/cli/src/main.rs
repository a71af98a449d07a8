mod cli;
mod infra;

fn main() {
    std::process::exit(cli::run());
}
