pub mod dry_run_csv;
