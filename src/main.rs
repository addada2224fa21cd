fn main() -> anyhow::Result<()> {
    slice_map::cli_main::main()
}
