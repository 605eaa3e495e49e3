use super::*;
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

// Parses a string as if it were an Efs2file.
fn parse_str(input: &str) -> Result<Vec<Task>, Rejection> {
    parse(Cursor::new(input))
}

mod parse {
    use super::*;

    #[test]
    fn sample_file() {
        let tasks = parse_str(
            "# deploy\n\
             RUN echo hi\n\
             PUT ./a.sh /tmp/a.sh 0755\n",
        )
        .unwrap();

        assert_eq!(
            vec![
                Task::new("RUN echo hi", Action::Command("echo hi".into())),
                Task::new(
                    "PUT ./a.sh /tmp/a.sh 0755",
                    Action::Upload(File::new("./a.sh", "/tmp/a.sh", 0o755)),
                ),
            ],
            tasks,
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(Vec::<Task>::new(), parse_str("").unwrap());
    }

    #[test]
    fn skips_blank_lines_and_comments() {
        let tasks = parse_str("\n   \n# one\n   # two\n#\n").unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn preserves_file_order() {
        let tasks = parse_str("RUN one\nRUN CMD two\nPUT a b 644\nRUN three\n").unwrap();
        let raw: Vec<_> = tasks.iter().map(Task::raw).collect();
        assert_eq!(vec!["RUN one", "RUN CMD two", "PUT a b 644", "RUN three"], raw);
    }

    #[test]
    fn trims_lines() {
        let tasks = parse_str("   RUN uptime   \n\tPUT a b 0600\t\n").unwrap();
        assert_eq!("RUN uptime", tasks[0].raw());
        assert_eq!(Some("uptime"), tasks[0].command());
        assert_eq!("PUT a b 0600", tasks[1].raw());
    }

    #[test]
    fn handles_crlf_line_endings() {
        let tasks = parse_str("RUN one\r\nRUN two\r\n").unwrap();
        assert_eq!(Some("one"), tasks[0].command());
        assert_eq!(Some("two"), tasks[1].command());
    }

    #[test]
    fn unrecognized_line_halts_parsing() {
        let rejection = parse_str("RUN one\nrun two\nRUN three\n").unwrap_err();

        assert_eq!(1, rejection.tasks.len());
        assert_eq!(Some("one"), rejection.tasks[0].command());
        match rejection.error {
            ParseError::Unrecognized { line, ref text } => {
                assert_eq!(2, line);
                assert_eq!("run two", text);
            }
            ref e => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn unrecognized_line_error_quotes_trimmed_line() {
        let rejection = parse_str("   COPY a b   \n").unwrap_err();
        assert_eq!(
            "Unable to parse Efs2file line 1: COPY a b",
            rejection.to_string(),
        );
    }

    #[test]
    fn bare_keywords_are_unrecognized() {
        for line in ["RUN", "PUT", "RUN ", "PUT a b"] {
            let rejection = parse_str(line).unwrap_err();
            assert!(
                matches!(rejection.error, ParseError::Unrecognized { .. }),
                "{line:?} was not rejected as unrecognized: {:?}",
                rejection.error,
            );
        }
    }

    #[test]
    fn read_error_returns_partial_tasks() {
        // Yields one good line, then fails.
        struct FailingReader {
            sent: bool,
        }

        impl Read for FailingReader {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.sent {
                    return Err(io::Error::other("expected"));
                }
                self.sent = true;
                let line = b"RUN one\n";
                buf[..line.len()].copy_from_slice(line);
                Ok(line.len())
            }
        }

        let reader = BufReader::new(FailingReader { sent: false });
        let rejection = parse(reader).unwrap_err();

        assert_eq!(1, rejection.tasks.len());
        assert!(matches!(
            rejection.error,
            ParseError::Read { line: 1, .. }
        ));
    }
}

mod run {
    use super::*;

    #[test]
    fn current_syntax() {
        let tasks = parse_str("RUN apt-get install -y nginx").unwrap();
        assert_eq!(
            &Action::Command("apt-get install -y nginx".into()),
            tasks[0].action(),
        );
    }

    #[test]
    fn collapses_whitespace() {
        let tasks = parse_str("RUN   echo \t hi    there").unwrap();
        assert_eq!(Some("echo hi there"), tasks[0].command());
        assert_eq!("RUN   echo \t hi    there", tasks[0].raw());
    }

    #[test]
    fn legacy_cmd() {
        let tasks = parse_str("RUN CMD systemctl  restart nginx").unwrap();
        assert_eq!(
            &Action::Command("systemctl restart nginx".into()),
            tasks[0].action(),
        );
    }

    #[test]
    fn cmd_without_text_is_a_plain_command() {
        // Without trailing text, this isn't the legacy form.
        let tasks = parse_str("RUN CMD").unwrap();
        assert_eq!(Some("CMD"), tasks[0].command());
    }

    #[test]
    fn legacy_script() {
        let tasks = parse_str("RUN SCRIPT ./setup.sh").unwrap();
        assert_eq!(1, tasks.len());

        let (file, command) = match tasks[0].action() {
            Action::Script { file, command } => (file, command),
            x => panic!("expected Action::Script but got:\n{x:#?}"),
        };

        assert_eq!("./setup.sh", file.source);
        assert_eq!(0o700, file.mode);
        assert!(file.destination.starts_with("/tmp/"));
        assert_eq!(
            format!("{0}; rm {0}", file.destination),
            command.as_str(),
        );
    }

    #[test]
    fn legacy_script_destinations_are_unique() {
        let input = "RUN SCRIPT a.sh\n".repeat(50);
        let tasks = parse_str(&input).unwrap();
        let destinations: HashSet<_> = tasks
            .iter()
            .map(|task| task.file().unwrap().destination.clone())
            .collect();
        assert_eq!(50, destinations.len());
    }
}

mod put {
    use super::*;

    #[test]
    fn four_digit_mode() {
        let tasks = parse_str("PUT files/nginx.conf /etc/nginx/nginx.conf 0644").unwrap();
        assert_eq!(
            &Action::Upload(File::new(
                "files/nginx.conf",
                "/etc/nginx/nginx.conf",
                0o644,
            )),
            tasks[0].action(),
        );
    }

    #[test]
    fn three_digit_mode() {
        let tasks = parse_str("PUT a b 750").unwrap();
        assert_eq!(0o750, tasks[0].file().unwrap().mode);
    }

    #[test]
    fn extra_whitespace_between_fields() {
        let tasks = parse_str("PUT  a \t b 0600").unwrap();
        assert_eq!(&File::new("a", "b", 0o600), tasks[0].file().unwrap());
    }

    #[test]
    fn wrong_field_count() {
        let rejection = parse_str("RUN ok\nPUT a b c 0644\nRUN never\n").unwrap_err();
        assert_eq!(1, rejection.tasks.len());
        assert!(matches!(
            rejection.error,
            ParseError::PutFieldCount { line: 2 }
        ));
        assert_eq!("PUT definition on line 2 is incorrect", rejection.to_string());
    }

    #[test]
    fn non_octal_mode() {
        let rejection = parse_str("# header\nPUT a b 0789\n").unwrap_err();
        assert!(rejection.tasks.is_empty());
        match rejection.error {
            ParseError::BadMode { line, ref mode } => {
                assert_eq!(2, line);
                assert_eq!("0789", mode);
            }
            ref e => panic!("unexpected error: {e:?}"),
        }
    }

    #[test]
    fn five_digit_mode_is_unrecognized() {
        let rejection = parse_str("PUT a b 07555").unwrap_err();
        assert!(matches!(
            rejection.error,
            ParseError::Unrecognized { line: 1, .. }
        ));
    }
}

mod parse_source {
    use super::*;

    #[test]
    fn reads_named_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "RUN whoami")?;
        writeln!(file, "PUT a b 0600")?;

        let tasks = parse_source(&Source::Path(file.path().to_owned()))?;
        assert_eq!(2, tasks.len());
        Ok(())
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Efs2file");

        let rejection = parse_source(&Source::Path(path.clone())).unwrap_err();
        assert!(rejection.tasks.is_empty());
        match rejection.error {
            ParseError::Open { path: p, .. } => assert_eq!(path, p),
            e => panic!("unexpected error: {e:?}"),
        }
    }
}

mod source {
    use super::*;

    #[test]
    fn dash_means_stdin() {
        assert_eq!(Source::Stdin, Source::from("-"));
        assert_eq!(Source::Stdin, Source::from(Path::new("-")));
    }

    #[test]
    fn anything_else_is_a_path() {
        assert_eq!(
            Source::Path(PathBuf::from("./Efs2file")),
            Source::from("./Efs2file"),
        );
        assert_eq!(Source::Path(PathBuf::from("--")), Source::from("--"));
    }
}

mod tmp_name {
    use super::*;

    #[test]
    fn nine_digits() {
        let name = tmp_name();
        assert_eq!(9, name.len());
        assert!(name.chars().all(|c| c.is_ascii_digit()), "{name}");
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn run_collapses_whitespace(
            words in prop::collection::vec("[a-z0-9./-]{1,8}", 1..6),
            gaps in prop::collection::vec("[ \t]{1,4}", 6),
        ) {
            // Lowercase words never collide with the legacy CMD/SCRIPT sub-keywords.
            let mut line = String::from("RUN ");
            for (word, gap) in words.iter().zip(&gaps) {
                line.push_str(word);
                line.push_str(gap);
            }

            let tasks = parse_str(&line).unwrap();
            prop_assert_eq!(1, tasks.len());
            let expected = words.join(" ");
            prop_assert_eq!(Some(expected.as_str()), tasks[0].command());
        }

        #[test]
        fn put_parses_octal_modes(mode in 0u32..=0o7777) {
            let line = format!("PUT src dst {mode:04o}");
            let tasks = parse_str(&line).unwrap();
            prop_assert_eq!(&File::new("src", "dst", mode), tasks[0].file().unwrap());
        }
    }
}
