//! Rendering of the extracted tables as a C header.
//!
//! The struct layouts and identifiers below are the contract with the boot
//! code that includes the header; they do not depend on the input tree.
//! Every number that ends up in the output is formatted here.

use std::fmt::{self, Write};

use crate::error::EmitError;
use crate::passes::{
    Console, Cpu, EnableMethod, InterruptController, InterruptSpecifier, Psci, PsciMethod, Region,
    Tables, Timer,
};

const PREAMBLE: &str = "\
#ifndef __GENERATED_GEN_DTB_H_
#define __GENERATED_GEN_DTB_H_

#ifndef __ASSEMBLY__

#include <base/types.h>
#include <base/init.h>
";

const DECLARATIONS: &str = "
struct memory_reg {
\tphys_addr_t base;
\tsize_t size;
#define NO_MAP 1
\tint flags;
};

struct devcie_node {
\tchar *compatile;
\tstruct memory_reg reg;
};

struct psci_devices {
\tphys_addr_t migrate;
\tphys_addr_t cpu_on;
\tphys_addr_t cpu_off;
\tphys_addr_t cpu_suspend;
#define HVC_METHOD 1
#define SMC_METHOD 2
\tint method;
\tint valid;
\tchar *compatible;
};

struct cpus_desc {
\tu32 reg;
#define ENABLE_METHOD_PSCI 1
#define ENABLE_METHOD_SPIN_TABLE 2
\tu32 enable_method;
\tchar *compatible;
};

struct interrupt_devices {
\tstruct memory_reg dist_base;
\tstruct memory_reg cpu_base;
\tstruct interrupt_devices *child;
\tchar *compatible;
};

struct interrupt_desc {
\tu32 irq_type;
\tu32 number;
\tu32 trig_type;
};

struct timer_devices {
\tconst struct interrupt_desc *timer_desc;
\tint always_on;
\tchar *compatible;
};
";

const EPILOGUE: &str = "
#endif /* !__ASSEMBLY__ */
#endif /* !__GENERATED_GEN_DTB_H_ */
";

/// A 64-bit quantity, as `0x%016x`.
struct Hex64(u64);

impl fmt::Display for Hex64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// A 32-bit quantity, as `0x%08x`.
struct Hex32(u32);

impl fmt::Display for Hex32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

struct RegionInit<'a>(&'a Region);

impl fmt::Display for RegionInit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ .base = {}, .size = {}, .flags = {} }}",
            Hex64(self.0.base),
            Hex64(self.0.size),
            Hex32(self.0.flags.bits())
        )
    }
}

/// Quote `value` as a C string literal. Nothing is escaped: a value that
/// would need it is rejected.
fn quote(field: &str, value: &str) -> Result<String, EmitError> {
    if value.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        return Err(EmitError::EscapeRequired {
            field: field.to_owned(),
            value: value.to_owned(),
        });
    }
    Ok(format!("\"{value}\""))
}

/// Render the complete header for `tables`.
pub fn render(tables: &Tables) -> Result<String, EmitError> {
    let mut emitter = Emitter::default();

    emitter.out.push_str(PREAMBLE);
    writeln!(
        emitter.out,
        "\nstatic const u32 fdt_totalsize __initconst = {};",
        Hex32(tables.total_size)
    )?;
    emitter.out.push_str(DECLARATIONS);
    writeln!(
        emitter.out,
        "\nstatic const char machine_name[] __initconst = {};",
        quote("machine_name", &tables.machine_name)?
    )?;

    emitter.initrd(tables.initrd.start, tables.initrd.end)?;
    emitter.regions("dtb_memory", &tables.memory)?;
    emitter.regions("dtb_reserverd_memory", tables.reserved.iter())?;
    if let Some(console) = &tables.console {
        emitter.console(console)?;
    }
    emitter.psci(tables.psci.as_ref())?;
    emitter.cpus(&tables.cpus)?;
    emitter.interrupt_controller(&tables.interrupt_controller)?;
    if let Some(timer) = &tables.timer {
        emitter.timer(timer)?;
    }

    emitter.out.push_str(EPILOGUE);
    Ok(emitter.out)
}

#[derive(Default)]
struct Emitter {
    out: String,
}

impl Emitter {
    fn initrd(&mut self, start: u64, end: u64) -> Result<(), EmitError> {
        write!(
            self.out,
            "
static const
phys_addr_t phys_initrd_start __initconst = {};

static const
phys_addr_t phys_initrd_end __initconst = {};
",
            Hex64(start),
            Hex64(end)
        )?;
        Ok(())
    }

    fn regions<'r>(
        &mut self,
        name: &str,
        regions: impl IntoIterator<Item = &'r Region>,
    ) -> Result<(), EmitError> {
        writeln!(self.out, "\nstatic const\nstruct memory_reg {name}[] __initconst = {{")?;
        for region in regions {
            writeln!(self.out, "\t{},", RegionInit(region))?;
        }
        writeln!(self.out, "}};")?;
        Ok(())
    }

    fn console(&mut self, console: &Console) -> Result<(), EmitError> {
        write!(
            self.out,
            "
static const
struct devcie_node dtb_stdout_path __initconst = {{
\t.compatile = {},
\t.reg = {},
}};
",
            quote("dtb_stdout_path.compatile", &console.compatible)?,
            RegionInit(&console.reg)
        )?;
        Ok(())
    }

    fn psci(&mut self, psci: Option<&Psci>) -> Result<(), EmitError> {
        writeln!(self.out, "\nstatic const\nstruct psci_devices psci_dt __initconst = {{")?;

        match psci {
            None => writeln!(self.out, "\t.valid = 0,")?,
            Some(psci) => {
                for (field, id) in [
                    ("migrate", psci.migrate),
                    ("cpu_on", psci.cpu_on),
                    ("cpu_off", psci.cpu_off),
                    ("cpu_suspend", psci.cpu_suspend),
                ] {
                    if let Some(id) = id {
                        writeln!(self.out, "\t.{field} = {},", Hex32(id))?;
                    }
                }
                if let Some(method) = psci.method {
                    let method = match method {
                        PsciMethod::Hvc => "HVC_METHOD",
                        PsciMethod::Smc => "SMC_METHOD",
                    };
                    writeln!(self.out, "\t.method = {method},")?;
                }
                if let Some(compatible) = &psci.compatible {
                    writeln!(
                        self.out,
                        "\t.compatible = {},",
                        quote("psci_dt.compatible", compatible)?
                    )?;
                }
                writeln!(self.out, "\t.valid = 1,")?;
            }
        }

        writeln!(self.out, "}};")?;
        Ok(())
    }

    fn cpus(&mut self, cpus: &[Cpu]) -> Result<(), EmitError> {
        writeln!(self.out, "\nstatic const\nstruct cpus_desc cpus_dt[] __initconst = {{")?;
        for (i, cpu) in cpus.iter().enumerate() {
            let enable_method = match cpu.enable_method {
                EnableMethod::Psci => "ENABLE_METHOD_PSCI",
                EnableMethod::SpinTable => "ENABLE_METHOD_SPIN_TABLE",
            };
            writeln!(
                self.out,
                "\t{{ .reg = {}, .enable_method = {enable_method}, .compatible = {} }},",
                Hex32(cpu.reg),
                quote(&format!("cpus_dt[{i}].compatible"), &cpu.compatible)?
            )?;
        }
        writeln!(self.out, "}};")?;
        Ok(())
    }

    fn interrupt_controller(&mut self, intc: &InterruptController) -> Result<(), EmitError> {
        write!(
            self.out,
            "
static const
struct interrupt_devices interrupt_dt __initconst = {{
\t.dist_base = {},
\t.cpu_base = {},
\t.child = NULL,
\t.compatible = {},
}};
",
            RegionInit(&intc.dist_base),
            RegionInit(&intc.cpu_base),
            quote("interrupt_dt.compatible", &intc.compatible)?
        )?;
        Ok(())
    }

    fn timer(&mut self, timer: &Timer) -> Result<(), EmitError> {
        writeln!(self.out, "\nstatic const\nstruct interrupt_desc timer_descs[] __initconst = {{")?;
        for specifier in &timer.interrupts {
            writeln!(self.out, "\t{},", SpecifierInit(specifier))?;
        }
        writeln!(self.out, "}};")?;

        write!(
            self.out,
            "
static const
struct timer_devices timer_dt __initconst = {{
\t.timer_desc = timer_descs,
\t.always_on = {},
\t.compatible = {},
}};
",
            u8::from(timer.always_on),
            quote("timer_dt.compatible", &timer.compatible)?
        )?;
        Ok(())
    }
}

struct SpecifierInit<'a>(&'a InterruptSpecifier);

impl fmt::Display for SpecifierInit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        if let Some(irq_type) = self.0.irq_type {
            write!(f, ".irq_type = {}, ", Hex32(irq_type))?;
        }
        write!(f, ".number = {}", Hex32(self.0.number))?;
        if let Some(trig_type) = self.0.trig_type {
            write!(f, ", .trig_type = {}", Hex32(trig_type))?;
        }
        f.write_str(" }")
    }
}
