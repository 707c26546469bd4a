fn main() -> std::process::ExitCode {
    fadadb_rust_lib::run()
}
