use irecipes_tui::cli::{self, Command};

fn main() {
    let invocation = match cli::parse(std::env::args().skip(1)) {
        Ok(invocation) => invocation,
        Err(err) => {
            eprintln!("error: {err}\n\n{}", cli::HELP);
            std::process::exit(2);
        }
    };

    match invocation.command {
        Command::Version => println!("iRecipes {}", irecipes_tui::VERSION),
        Command::Help => println!("{}", cli::HELP),
        _ => {
            if let Err(err) = irecipes_tui::run(invocation) {
                eprintln!("error: {err:?}");
                std::process::exit(1);
            }
        }
    }
}
