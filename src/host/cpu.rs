use std::io::{Error, ErrorKind, Result};

/// Parses a kernel CPU list such as `0-3,5,7-11`.
pub fn parse_cpu_list(text: &str) -> Result<Vec<i32>> {
    let mut cpus = vec![];
    for part in text.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start = parse_cpu(start)?;
            let end = parse_cpu(end)?;
            if end < start {
                return Err(invalid(part));
            }
            cpus.extend(start..=end);
        } else {
            cpus.push(parse_cpu(part)?);
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

fn parse_cpu(text: &str) -> Result<i32> {
    text.trim()
        .parse::<u16>()
        .map(i32::from)
        .map_err(|_| invalid(text))
}

fn invalid(text: &str) -> Error {
    Error::new(ErrorKind::InvalidData, format!("bad cpu list entry `{}`", text))
}

#[cfg(test)]
mod test {
    use super::parse_cpu_list;

    #[test]
    fn test_parse_cpu_list() {
        assert_eq!(parse_cpu_list("0-3\n").unwrap(), [0, 1, 2, 3]);
        assert_eq!(parse_cpu_list("0,2-3,7").unwrap(), [0, 2, 3, 7]);
        assert_eq!(parse_cpu_list("5").unwrap(), [5]);
        assert_eq!(parse_cpu_list("").unwrap(), Vec::<i32>::new());
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a-b").is_err());
        assert!(parse_cpu_list("-1").is_err());
    }
}
