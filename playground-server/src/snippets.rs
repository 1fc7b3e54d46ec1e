use std::collections::BTreeMap;

use playground_exec::{Language, LanguageRegistry};

/// Starter program shown by the editor for `language`.
pub fn starter(language: Language) -> &'static str {
    match language {
        Language::Python => "print('Hello, World!')",
        Language::JavaScript => "console.log('Hello, World!');",
        Language::Java => {
            "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello, World!\");\n    }\n}"
        }
        Language::Cpp => {
            "#include <iostream>\n\nint main() {\n    std::cout << \"Hello, World!\" << std::endl;\n    return 0;\n}"
        }
        Language::Go => {
            "package main\n\nimport \"fmt\"\n\nfunc main() {\n    fmt.Println(\"Hello, World!\")\n}"
        }
    }
}

/// Starter programs for every language the registry serves, keyed by id.
pub fn catalogue(registry: &LanguageRegistry) -> BTreeMap<&'static str, &'static str> {
    registry
        .languages()
        .map(|language| (language.as_str(), starter(language)))
        .collect()
}
