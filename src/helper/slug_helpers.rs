use regex::Regex;
use std::sync::OnceLock;

fn transliterate_char(c: char) -> Option<&'static str> {
    let latin = match c {
        'а' => "a", 'б' => "b", 'в' => "v", 'г' => "g", 'ґ' => "g", 'д' => "d",
        'е' => "e", 'ё' => "yo", 'ж' => "zh", 'з' => "z", 'и' => "i", 'і' => "i",
        'й' => "y", 'к' => "k", 'л' => "l", 'м' => "m", 'н' => "n", 'о' => "o",
        'п' => "p", 'р' => "r", 'с' => "s", 'т' => "t", 'у' => "u", 'ў' => "u",
        'ф' => "f", 'х' => "kh", 'ц' => "ts", 'ч' => "ch", 'ш' => "sh", 'щ' => "shch",
        'ъ' => "", 'ы' => "y", 'ь' => "", 'э' => "e", 'ю' => "yu", 'я' => "ya",
        '’' | '\'' => "",
        _ => return None,
    };
    Some(latin)
}

fn separators() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// URL-safe transliteration of a title: Cyrillic to Latin, lowercase,
/// runs of anything else collapsed to a single `-`.
pub fn slugify(title: &str) -> String {
    let mut latin = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        match transliterate_char(c) {
            Some(s) => latin.push_str(s),
            None => latin.push(c),
        }
    }
    separators()
        .replace_all(&latin, "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::slugify;

    #[test]
    fn transliterates_russian_titles() {
        assert_eq!(slugify("Обложки METALBIND"), "oblozhki-metalbind");
        assert_eq!(slugify("Твердые обложки А4 синие упак. 10пар"), "tverdye-oblozhki-a4-sinie-upak-10par");
    }

    #[test]
    fn transliterates_belarusian_letters() {
        assert_eq!(slugify("Беларуская мова і ўсё"), "belaruskaya-mova-i-usyo");
    }

    #[test]
    fn collapses_punctuation() {
        assert_eq!(slugify("  Hello,   World!! "), "hello-world");
        assert_eq!(slugify("—"), "");
    }
}
