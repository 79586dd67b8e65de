fn main() -> Result<(), Box<dyn std::error::Error>> {
    chatwire::cli::main()
}
