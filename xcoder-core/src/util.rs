/// Attempts to create the directory (and parents) if it does not exist,
/// logging and propagating any error other than "already exists".
#[macro_export]
macro_rules! create_dir {
  ($loc:expr) => {
    match std::fs::create_dir_all(&$loc) {
      Ok(_) => Ok(()),
      Err(e) => match e.kind() {
        std::io::ErrorKind::AlreadyExists => Ok(()),
        _ => {
          log::error!("error while creating directory {:?}: {}", &$loc, e);
          Err(e)
        }
      },
    }
  };
}

#[inline]
pub(crate) fn human_bytes(bytes: u64) -> String {
  const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
  let mut size = bytes as f64;
  let mut unit = 0;
  while size >= 1024.0 && unit < UNITS.len() - 1 {
    size /= 1024.0;
    unit += 1;
  }
  if unit == 0 {
    format!("{} {}", bytes, UNITS[unit])
  } else {
    format!("{:.2} {}", size, UNITS[unit])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn human_bytes_formats_units() {
    assert_eq!(human_bytes(512), "512 B");
    assert_eq!(human_bytes(2048), "2.00 KiB");
    assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MiB");
  }
}
