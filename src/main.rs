fn main() -> std::process::ExitCode {
    stackyard::run()
}
