use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

/// Conteo palabra -> ocurrencias, ordenado por palabra.
pub type WordCounts = BTreeMap<String, u64>;

/// Limpia un token: sólo alfanumérico y '_', en minúscula.
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_lowercase();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Suma las palabras de una línea al conteo.
pub fn count_line(line: &str, counts: &mut WordCounts) {
    for word in line.split_whitespace().filter_map(normalize) {
        *counts.entry(word).or_insert(0) += 1;
    }
}

/// Parsea una línea "palabra,conteo" de una salida de map.
pub fn parse_count_line(line: &str) -> Option<(&str, u64)> {
    let (word, count) = line.rsplit_once(',')?;
    if word.is_empty() {
        return None;
    }
    Some((word, count.trim().parse().ok()?))
}

/// Escribe "palabra,conteo" en `output_path`, creando la carpeta si hace
/// falta. Devuelve cuántas líneas escribió.
pub fn write_counts(output_path: &Path, counts: &WordCounts) -> io::Result<usize> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(output_path)?);
    for (word, count) in counts {
        writeln!(writer, "{},{}", word, count)?;
    }
    writer.flush()?;
    Ok(counts.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_tokenized_and_normalized() {
        let mut counts = WordCounts::new();
        count_line("Hola hola, mundo!!", &mut counts);
        count_line("mundo   mundo_prueba ¿?", &mut counts);

        let got: Vec<(&str, u64)> = counts.iter().map(|(w, c)| (w.as_str(), *c)).collect();
        assert_eq!(got, vec![("hola", 2), ("mundo", 2), ("mundo_prueba", 1)]);
    }

    #[test]
    fn count_lines_parse_back() {
        assert_eq!(parse_count_line("hola,2"), Some(("hola", 2)));
        assert_eq!(parse_count_line("sin_conteo"), None);
        assert_eq!(parse_count_line(",3"), None);
        assert_eq!(parse_count_line("hola,x"), None);
    }

    /// Debe crear directorios intermedios para el output si no existen.
    #[test]
    fn write_counts_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("subdir1").join("subdir2");
        let output = nested.join("out.csv");

        let mut counts = WordCounts::new();
        count_line("test test", &mut counts);
        assert_eq!(write_counts(&output, &counts).unwrap(), 1);

        assert!(nested.exists());
        assert_eq!(fs::read_to_string(&output).unwrap().trim(), "test,2");
    }

    /// Conteo vacío: el archivo se crea igual, sin líneas.
    #[test]
    fn empty_counts_create_an_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let output = tmp.path().join("out.csv");

        assert_eq!(write_counts(&output, &WordCounts::new()).unwrap(), 0);
        assert!(fs::read_to_string(&output).unwrap().is_empty());
    }
}
