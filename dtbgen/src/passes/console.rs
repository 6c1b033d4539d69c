use dtb_parser::{query, Node};
use log::debug;

use super::{compatible, display_name, string, Context, Region};
use crate::error::PassError;

/// The device behind `/chosen/stdout-path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Console {
    pub compatible: String,
    pub reg: Region,
}

pub fn scan(ctx: &Context) -> Result<Option<Console>, PassError> {
    let chosen = match ctx.top_level("chosen") {
        Some(chosen) => chosen.node,
        None => return Ok(None),
    };
    let path = match stdout_path(chosen)? {
        Some(path) => path,
        None => {
            debug!("no stdout path in /chosen, no console");
            return Ok(None);
        }
    };

    // `serial0:115200n8` names the device `serial0`.
    let path = path.split_once(':').map_or(path, |(path, _)| path);
    let path = if path.starts_with('/') {
        path
    } else {
        match alias(ctx, path)? {
            Some(path) => path,
            None => {
                debug!("stdout alias `{path}` does not resolve, no console");
                return Ok(None);
            }
        }
    };

    let name = path.rsplit_once('/').map_or(path, |(_, name)| name);
    if name.is_empty() {
        return Ok(None);
    }

    let found = query::find_nodes(ctx.root, |node| {
        node.name == name && node.has_property("compatible")
    });
    let scoped = match found.first() {
        Some(scoped) => scoped,
        None => {
            debug!("no device named `{name}` with a `compatible`, no console");
            return Ok(None);
        }
    };

    let node = scoped.node;
    let reg = ctx
        .regions(node, scoped.geometry)?
        .into_iter()
        .next()
        .ok_or_else(|| PassError::MissingProperty {
            node: display_name(node),
            property: "reg",
        })?;

    Ok(Some(Console {
        compatible: compatible(node)?.unwrap_or_default(),
        reg,
    }))
}

fn stdout_path(chosen: &Node) -> Result<Option<&str>, PassError> {
    for property in ["stdout-path", "linux,stdout-path"] {
        if let Some(path) = string(chosen, property)? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

fn alias<'a>(ctx: &Context<'a>, name: &str) -> Result<Option<&'a str>, PassError> {
    let aliases = match ctx.top_level("aliases") {
        Some(aliases) => aliases.node,
        None => return Ok(None),
    };

    match aliases.value(name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| PassError::UnexpectedValue {
                node: display_name(aliases),
                property: "alias",
                expected: "a string",
                found: value.kind(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use dtb_parser::testing::BlobBuilder;

    use super::*;
    use crate::config::GeometryMode;
    use crate::passes::decode;

    fn board(stdout_path: &str) -> BlobBuilder {
        BlobBuilder::new()
            .begin_node("")
            .prop_cells("#address-cells", &[2])
            .prop_cells("#size-cells", &[2])
            .begin_node("aliases")
            .prop_str("serial0", "/pl011@9000000")
            .end_node()
            .begin_node("chosen")
            .prop_str("stdout-path", stdout_path)
            .end_node()
            .begin_node("pl011@9000000")
            .prop_cells("reg", &[0x0, 0x900_0000, 0x0, 0x1000])
            .prop_strs("compatible", &["arm,pl011", "arm,primecell"])
            .end_node()
            .end_node()
    }

    fn scan_blob(builder: BlobBuilder) -> Result<Option<Console>, PassError> {
        let fdt = decode(builder);
        scan(&Context::new(&fdt, GeometryMode::Scoped))
    }

    #[test]
    fn stdout_path_forms() {
        let expected = Console {
            compatible: "arm,primecell".into(),
            reg: Region::new(0x900_0000, 0x1000),
        };

        for path in ["/pl011@9000000", "/pl011@9000000:115200n8", "serial0", "serial0:115200n8"] {
            assert_eq!(scan_blob(board(path)), Ok(Some(expected.clone())), "{path}");
        }
    }

    #[test]
    fn unresolved_console() {
        for path in ["serial1", "/uart@1000", "/"] {
            assert_eq!(scan_blob(board(path)), Ok(None), "{path}");
        }

        let builder = BlobBuilder::new().begin_node("").begin_node("chosen").end_node().end_node();
        assert_eq!(scan_blob(builder), Ok(None));
    }

    #[test]
    fn legacy_property_name() {
        let builder = BlobBuilder::new()
            .begin_node("")
            .prop_cells("#address-cells", &[1])
            .prop_cells("#size-cells", &[1])
            .begin_node("chosen")
            .prop_str("linux,stdout-path", "/soc/uart@10000000")
            .end_node()
            .begin_node("soc")
            .begin_node("uart@10000000")
            .prop_cells("reg", &[0x1000_0000, 0x100])
            .prop_strs("compatible", &["ns16550a", "snps,dw-apb-uart"])
            .end_node()
            .end_node()
            .end_node();

        assert_eq!(
            scan_blob(builder),
            Ok(Some(Console {
                compatible: "snps,dw-apb-uart".into(),
                reg: Region::new(0x1000_0000, 0x100),
            }))
        );
    }

    #[test]
    fn console_without_reg() {
        let builder = BlobBuilder::new()
            .begin_node("")
            .begin_node("chosen")
            .prop_str("stdout-path", "/hvc")
            .end_node()
            .begin_node("hvc")
            .prop_strs("compatible", &["xen", "xen,hvc"])
            .end_node()
            .end_node();

        assert_eq!(
            scan_blob(builder),
            Err(PassError::MissingProperty {
                node: "hvc".into(),
                property: "reg"
            })
        );
    }
}
