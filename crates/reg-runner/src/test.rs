use super::*;

#[test]
fn parses_defaults() {
    let args = Args::try_parse_from(["reg-runner"]).unwrap();
    assert_eq!(args.path, None);
    assert_eq!(args.step_limit, DEFAULT_STEP_LIMIT);
    assert_eq!(args.format, Format::Text);
}

#[test]
fn parses_flags() {
    let args = Args::try_parse_from([
        "reg-runner",
        "prog.txt",
        "--step-limit",
        "-1",
        "--format",
        "json",
    ])
    .unwrap();
    assert_eq!(args.path, Some(PathBuf::from("prog.txt")));
    assert_eq!(args.step_limit, -1);
    assert_eq!(args.format, Format::Json);
}

#[test]
fn runs_program_from_file() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "lodi a 3\nlodi b 4\naddr a b\nhalt")?;
    let path = file.path().to_string_lossy().into_owned();
    let args = Args::try_parse_from(["reg-runner", path.as_str()])?;
    let machine = run(&args)?;
    assert!(machine.is_halted());
    assert_eq!(machine.registers().as_tuple(), (7, 4, 0, 0, 4));
    Ok(())
}

#[test]
fn step_limit_flag_reaches_machine() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "loop:\njump loop")?;
    let path = file.path().to_string_lossy().into_owned();
    let args = Args::try_parse_from(["reg-runner", path.as_str(), "--step-limit", "5"])?;
    let machine = run(&args)?;
    assert!(machine.is_errored());
    assert_eq!(machine.steps(), 5);
    Ok(())
}

#[test]
fn missing_file_is_host_error() {
    let err = read_source(Some(Path::new("/definitely/not/here.reg"))).unwrap_err();
    assert!(format!("{err:#}").contains("/definitely/not/here.reg"));
}
