//! List Command

use anyhow::Result;
use clap::Args;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use testdeck_runner::{discovery, RunnerConfig};

#[derive(Args)]
pub struct ListArgs {
    /// Also list the test cases declared in each file
    #[arg(long)]
    pub cases: bool,
}

pub fn execute(config: &RunnerConfig, args: ListArgs) -> Result<()> {
    let files = discovery::list_test_files(config);
    if files.is_empty() {
        println!("No test files found under {}", config.project_root.display());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    if args.cases {
        table.set_header(vec!["File", "Test case"]);
        for file in &files {
            let path = config.project_root.join(file);
            match discovery::list_test_cases(&path) {
                Ok(titles) if titles.is_empty() => {
                    table.add_row(vec![file.as_str(), "(no test declarations found)"]);
                }
                Ok(titles) => {
                    for title in titles {
                        table.add_row(vec![file.clone(), title]);
                    }
                }
                Err(e) => {
                    table.add_row(vec![file.clone(), format!("error: {}", e)]);
                }
            }
        }
    } else {
        table.set_header(vec!["File"]);
        for file in &files {
            table.add_row(vec![file.as_str()]);
        }
    }

    println!("{table}");
    Ok(())
}
